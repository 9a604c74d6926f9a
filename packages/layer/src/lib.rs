#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature-to-layer resolution and rendering surface reconciliation.
//!
//! The pieces run in this order for each fetched feature collection:
//!
//! 1. [`builder::LayerSetBuilder`] normalizes each feature's properties,
//!    picks its current reading with [`selector::select_current`], and
//!    styles it with [`style::resolve_style`].
//! 2. [`reconcile::Reconciler`] replaces everything the previous pass put
//!    on the [`surface::RenderSurface`] for that source with the new set,
//!    under a per-source [`reconcile::Ticket`] so that a superseded pass
//!    never overwrites a newer one.

pub mod builder;
pub mod reconcile;
pub mod selector;
pub mod style;
pub mod surface;
pub mod viewport;

pub use builder::{FeatureError, FeatureFailure, LayerSet, LayerSetBuilder};
pub use reconcile::{Outcome, ReconcileError, Reconciler, Ticket};
pub use selector::{CategoryFilter, select_current};
pub use style::{ColorRamp, StepRamp, resolve_style};
pub use surface::{RenderSurface, StyleDocument, SurfaceError};
pub use viewport::BoundingBox;
