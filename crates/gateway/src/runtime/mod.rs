//! Runtime support shared by the API layer.
//!
//! Everything beyond cancellation (sub-agent turns, schedules, deliveries,
//! quotas, approvals...) belonged to the teacher's much larger surface and
//! has no counterpart in this gateway's 9-route scope; see DESIGN.md.

pub mod cancel;
