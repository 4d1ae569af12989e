use serde::{Deserialize, Serialize};

/// Generation-checked handle to a body stored in an [`Arena`].
///
/// Removing a body bumps the generation of its slot, so a handle kept
/// across the removal no longer resolves instead of aliasing the next
/// occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId {
    index: u32,
    generation: u32,
}

impl BodyId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<usize> },
}

impl<T> Slot<T> {
    fn generation(&self) -> u32 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation, .. } => *generation,
        }
    }

    fn value_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }
}

/// Slot arena addressed by [`BodyId`]s.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<usize>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> BodyId {
        self.len += 1;
        if let Some(index) = self.free_head {
            let generation = self.slots[index].generation();
            if let Slot::Vacant { next_free, .. } = &self.slots[index] {
                self.free_head = *next_free;
            }
            self.slots[index] = Slot::Occupied { generation, value };
            return BodyId::new(index, generation);
        }

        let index = self.slots.len();
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        BodyId::new(index, 0)
    }

    pub fn contains(&self, id: BodyId) -> bool {
        matches!(
            self.slots.get(id.index()),
            Some(Slot::Occupied { generation, .. }) if *generation == id.generation()
        )
    }

    pub fn get(&self, id: BodyId) -> Option<&T> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation() => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut T> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation() => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Mutable access to two distinct bodies at once.
    pub fn get2_mut(&mut self, a: BodyId, b: BodyId) -> Option<(&mut T, &mut T)> {
        if a.index() == b.index() || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (low, high, flipped) = if a.index() < b.index() {
            (a, b, false)
        } else {
            (b, a, true)
        };
        let (left, right) = self.slots.split_at_mut(high.index());
        let first = left[low.index()].value_mut()?;
        let second = right[0].value_mut()?;
        if flipped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    /// Removes a value and invalidates every outstanding handle to it.
    pub fn remove(&mut self, id: BodyId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        let index = id.index();
        let vacant = Slot::Vacant {
            generation: id.generation().wrapping_add(1),
            next_free: self.free_head,
        };
        let previous = std::mem::replace(&mut self.slots[index], vacant);
        self.free_head = Some(index);
        self.len -= 1;
        match previous {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((BodyId::new(index, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((BodyId::new(index, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }

    pub fn ids(&self) -> Vec<BodyId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
