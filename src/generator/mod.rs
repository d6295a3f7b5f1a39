//! Generator contract and request dispatch
//!
//! A [`Generator`] turns a document into page images and text. The
//! [`Dispatcher`] wraps one generator instance and owns the machinery around
//! it: lifecycle, the pixmap and text lanes, and the completion channel.

mod dispatch;
mod export;
mod feature;
mod page;
mod queue;
mod request;
mod traits;
mod types;
mod worker;

pub use dispatch::{Dispatch, Dispatcher, LifecycleState};
pub use export::{ExportFormat, StandardExportFormat};
pub use feature::{Feature, FeatureSet};
pub use page::{NormalizedRect, Page, PageInfo, PageRef, Rotation, TextEntity, TextPage, lock_page};
pub use queue::RequestQueue;
pub use request::{
    Completion, PixmapRequest, Prioritized, RequestKind, RequesterId, TextPageRequest,
};
pub use traits::Generator;
pub use types::*;
