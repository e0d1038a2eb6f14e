//! Resource reconciliation protocol
//!
//! Providers are driven through check, create, diff, and update over loosely
//! typed property bags. Check reports invalid inputs as data rather than as
//! an error so a caller can surface every problem at once; the other
//! operations only run on inputs that already passed check.

pub mod rotate;

pub use rotate::{MultiRotate, RotationInputs, RotationState};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WindlassResult;

/// One rejected input property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub property: String,
    pub reason: String,
}

/// Inputs with defaults applied, plus everything wrong with the raw ones.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub inputs: Value,
    pub failures: Vec<CheckFailure>,
}

/// Identifier and initial outputs of a newly created resource.
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub id: String,
    pub outs: Value,
}

/// Whether observed state diverges from the declared inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffResult {
    pub changes: bool,
}

/// Outputs after reconciling a resource to its declared inputs.
#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub outs: Value,
}

/// Lifecycle contract a managed resource is driven through.
///
/// `olds` carries the outputs recorded by the previous operation, `news` the
/// currently declared inputs. Implementations must tolerate observed state
/// written by older versions of themselves.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Validate raw inputs and apply defaults. Invalid properties are
    /// reported in the result, never as an error.
    async fn check(&self, olds: Value, news: Value) -> CheckResult;

    /// Create the resource from checked inputs.
    async fn create(&self, inputs: Value) -> WindlassResult<CreateResult>;

    /// Report whether the resource needs an update.
    async fn diff(&self, id: &str, olds: Value, news: Value) -> WindlassResult<DiffResult>;

    /// Reconcile the resource to the declared inputs.
    async fn update(&self, id: &str, olds: Value, news: Value) -> WindlassResult<UpdateResult>;
}
