//! Simulation dynamics modules: vehicle force models, integration, grouping and the contact solver.

pub mod forces;
pub mod grouping;
pub mod integrator;
pub mod penetration;
pub mod rotor;
pub mod solver;
pub mod suspension;
pub mod tire;
pub mod vehicle;

pub use forces::{
    ControlInput, ControlProvider, ExternalForceProvider, ForceRegistry, GravityProvider,
    WindProvider,
};
pub use grouping::{CollisionGroup, CollisionGrouper, PhysicsPhase};
pub use integrator::Integrator;
pub use penetration::PenetrationLimits;
pub use rotor::{BaseRotor, EnginePowerIntent, GravityCorrection, Rotor};
pub use solver::{ConstraintSolver, SolverStepMetrics};
pub use suspension::ShockAbsorber;
pub use tire::{CombinedMagicFormula, MagicFormula, MagicFormulaArgmax, MagicFormulaMode, Tire};
pub use vehicle::{TireRay, Vehicle, VehicleControls};
