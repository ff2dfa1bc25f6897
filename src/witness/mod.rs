//! Witness replication: records, handlers, and ordered dispatch.
//!
//! ## Key Types
//!
//! - `WitnessRecord`: Immutable, schema-checked record of one resolved action
//! - `WitnessKind`: Closed set of witness kinds; the string name lives on the wire only
//! - `WitnessFrame`: A witness plus its stream sequence number, as transmitted
//! - `WitnessHandler`: Applies one kind of witness to local state
//! - `WitnessHandlerRegistry`: One handler per kind
//! - `WitnessDispatcher`: Applies witnesses strictly in order with back-pressure
//!
//! ## Pacing
//!
//! A handler may defer (for an animation, say) by returning
//! `Handled::Deferred`. Nothing after that witness runs until the
//! `CompletionTicket` it was given is passed back to
//! `WitnessDispatcher::complete`. Presentation speed therefore delays the
//! stream but never drops from it.

pub mod value;
pub mod record;
pub mod handler;
pub mod registry;
pub mod dispatcher;
pub mod typed;

pub use value::{IntList, ValueType, WitnessValue};
pub use record::{VariableSpec, WitnessBuilder, WitnessError, WitnessFrame, WitnessKind, WitnessRecord, WitnessVariables};
pub use handler::{CompletionTicket, FnHandler, Handled, HandlerError, WitnessHandler};
pub use registry::{RegistryError, WitnessHandlerRegistry};
pub use dispatcher::{DesyncError, DesyncReason, DispatchReport, Ingest, SkippedWitness, WitnessDispatcher};
pub use typed::{UseCard, UseTarget};
