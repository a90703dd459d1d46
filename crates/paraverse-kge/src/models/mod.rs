//! Reference embedding models.
//!
//! | Model | Energy | Notes |
//! |-------|--------|-------|
//! | [`TransE`] | `‖h + r − t‖ₚ` | p ∈ {1, 2}, vectorized batch scoring |

mod transe;

pub use transe::{TransE, TransEFactory};
