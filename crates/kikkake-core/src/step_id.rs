//! Stable step identifiers derived from source paths.

use uuid::Uuid;

/// Namespace all step ids are derived in.
pub const STEP_NAMESPACE: Uuid = Uuid::from_u128(0x7f1c3ff2_9b00_4d0a_bdd7_efb8bca49d4f);

/// Returns the stable id of the step defined at `path`.
///
/// The same path always yields the same id, across processes and builds.
///
/// ```
/// use kikkake_core::generate_step_id;
///
/// assert_eq!(generate_step_id("steps/a.rs"), generate_step_id("steps/a.rs"));
/// assert_ne!(generate_step_id("steps/a.rs"), generate_step_id("steps/b.rs"));
/// ```
pub fn generate_step_id(path: &str) -> Uuid {
    Uuid::new_v5(&STEP_NAMESPACE, path.as_bytes())
}
