//! # cortex-hooks
//!
//! The four host lifecycle handlers. Every `handle_*` entry point reads a
//! JSON payload, does its work, and returns 0 — errors become a single
//! stderr line, never a nonzero exit. The host must not be blocked by its
//! memory engine.

pub mod handlers;
pub mod payload;
pub mod projections;

pub use handlers::{
    handle_precompact, handle_session_start, handle_stop, handle_user_prompt_submit,
    run_precompact, run_session_start, run_stop, run_user_prompt_submit,
};
pub use payload::{read_payload, CwdPayload, PromptPayload, StopPayload};
