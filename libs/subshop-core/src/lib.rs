//! Payment selection and fulfillment for the subscription shop bot.
//!
//! Callback tokens drive a stateless plan → method → invoice menu ([`flow`]), payment
//! sessions are opened with external processors ([`orchestrator`], [`processor`]) and
//! completion notifications are reconciled into purchases exactly once ([`webhook`],
//! [`fulfillment`]).

pub mod cache;
pub mod config;
pub mod deadline;
pub mod error;
pub mod flow;
pub mod fulfillment;
pub mod menu;
pub mod orchestrator;
pub mod policy;
pub mod processor;
pub mod token;
pub mod webhook;

pub use config::{PaymentConfig, PriceTable};
pub use error::{PaymentError, Result};
pub use flow::{CallbackContext, FlowController, FlowOutcome};
pub use token::{Action, CallbackToken};
