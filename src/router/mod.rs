//! Router Module
//!
//! Credential selection and cost tiers.

pub mod balancer;
pub mod tier;

pub use balancer::{Router, Selection};
pub use tier::{Complexity, ModelTier, TierPolicy};
