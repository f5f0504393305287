//! Wire format types, one module per supported protocol
//!
//! Pure serde mirrors of each protocol's JSON shapes; all mapping logic
//! lives in [`crate::convert`].

pub mod anthropic;
pub mod openai;
