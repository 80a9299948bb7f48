//! Logs into a ManageBac portal, scrapes the assignment listings of a set of
//! views and classifies every assignment by status, priority and urgency.

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::absolute_paths,
    clippy::arithmetic_side_effects,
    clippy::as_conversions,
    clippy::cast_lossless, // u32 -> u64
    clippy::cast_possible_truncation, // u64 -> u32
    clippy::cast_possible_wrap, // u32 -> i32
    clippy::cast_sign_loss, // i32 -> u32
    clippy::option_if_let_else,
    clippy::future_not_send,
    clippy::host_endian_bytes,
    clippy::implicit_return,
    clippy::indexing_slicing,
    clippy::inline_always,
    clippy::integer_division,
    clippy::min_ident_chars,
    clippy::missing_assert_message,
    clippy::missing_trait_methods,
    clippy::module_name_repetitions,
    clippy::multiple_unsafe_ops_per_block,
    clippy::needless_pass_by_value,
    clippy::non_ascii_literal,
    clippy::single_char_lifetime_names,
    clippy::pattern_type_mismatch,
    clippy::pub_use,
    clippy::question_mark_used,
    clippy::ref_patterns,
    clippy::self_named_module_files,
    clippy::shadow_reuse,
    clippy::shadow_unrelated,
    clippy::similar_names,
    clippy::single_call_fn,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::string_add,
    clippy::unseparated_literal_suffix,
    clippy::wildcard_enum_match_arm,
    non_snake_case,
)]

pub mod auth;
pub mod classify;
pub mod collect;
pub mod config;
pub mod details;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod scrape;
pub mod view;

pub use classify::{AssignmentRecord, Kind, Priority, Status};
pub use config::{Config, Credentials};
pub use details::AssignmentDetails;
pub use error::{ConfigError, PipelineError, ViewError, ViewFailure};
pub use events::{Event, EventSink, Level, MemorySink, TracingSink};
pub use pipeline::{Acquisition, acquire_assignments, acquire_assignments_with};
