//! Social-data API client and the repositories that type its responses.
//!
//! [`client::SocialApi`] only moves raw bodies over HTTP; decoding into
//! [`types::ThreadPage`] and [`types::AccountInfo`] happens in
//! [`repository`], which also exposes the [`SocialData`] seam the worker
//! pipeline is written against.
pub mod client;
pub mod repository;
pub mod types;

pub use client::SocialApi;
pub use repository::{AccountRepository, SocialData, SocialRepository, ThreadRepository};
pub use types::{AccountInfo, Thread, ThreadPage};
