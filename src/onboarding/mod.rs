//! Onboarding workflow — account registration as a resumable step graph.
//!
//! The user picks an account type, fills in the details for that branch,
//! then portfolio, address and a verification document. Each step is
//! validated and committed to the account backend before the engine moves
//! on, and progress is persisted so the flow resumes after an app restart.

pub mod engine;
pub mod gateway;
pub mod graph;
pub mod model;
pub mod state;
pub mod validator;

pub use engine::{EngineDeps, OnboardingStatus, StepOutcome, WorkflowEngine};
pub use gateway::{AuthGateway, HttpAuthGateway, InMemoryAuthGateway};
pub use graph::{NextStep, StepRecord, Successor, WorkflowGraph};
pub use model::{AccountType, Address, DocumentRef, FieldValue, PortfolioItem, ProfileDraft};
pub use state::{EngineState, Position, StepId};
pub use validator::{RequiredFieldsValidator, StepValidator, ValidationResult};
