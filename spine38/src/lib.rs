//! Pure Rust runtime for Spine 3.8 binary skeletons (unofficial).
//!
//! [`SkeletonBinary`] turns a `.skel` buffer into immutable [`SkeletonData`]. A [`Skeleton`] is a
//! posable instance of that data; [`Animation::apply`] and [`AnimationState`] pose it, and
//! [`Skeleton::update_world_transform`] resolves bone hierarchies and constraints.
//!
//! The crate is renderer-agnostic. Textures and other renderer resources are bound through an
//! [`AttachmentLoader`].

#![forbid(unsafe_code)]

mod attachment;
mod config;
mod curve;
mod error;
mod input;
mod loader;
mod model;
mod runtime;
mod timeline;

pub mod binary;

pub use attachment::*;
pub use binary::{SkeletonBinary, load_skeleton};
pub use config::*;
pub use curve::{BezierCurve, Curve};
pub use error::*;
pub use input::BinaryInput;
pub use loader::*;
pub use model::*;
pub use runtime::*;
pub use timeline::*;
