pub mod entities;
pub mod error;
pub mod identity;
pub mod portable_text;
pub mod posts;
pub mod slug;
pub mod types;
