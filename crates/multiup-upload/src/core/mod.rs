//! Pure transformations: ordering, retry decisions, progress deltas and
//! response scraping.

mod captcha;
mod extract;
mod form;
mod natural_sort;
mod progress;
mod retry;

pub use captcha::solve_positional_captcha;
pub use extract::{check_status, classify_status, error_message, looks_like_stale_auth, missing_value};
pub use form::hidden_fields;
pub use natural_sort::{natural_cmp, sort_naturally_by};
pub use progress::TransferProgress;
pub use retry::{RetryDecision, RetryPolicy, retry_delay};
