//! Per-source layer reconciliation.
//!
//! Each pass for a source is issued a [`Ticket`]. Only the holder of the
//! most recent ticket may touch the surface; an older ticket is reported as
//! [`Outcome::Superseded`] and nothing changes. The [`Reconciler`] records
//! which layers it placed for every source so the next pass can remove
//! layers whose features disappeared from the feed.

use std::collections::{BTreeMap, BTreeSet};

use ecosensor_layer_models::{GeoJsonSourceSpec, LayerDescriptor, LayerSpec};

use crate::surface::{RenderSurface, SurfaceError};

/// Errors raised while applying a layer set.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The surface rejected an operation.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Proof that a pass was started for a source, and when.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket {
    source_name: String,
    generation: u64,
}

impl Ticket {
    /// The source this ticket was issued for.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Issue order within the source, starting at 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Issues monotonically increasing tickets per source.
#[derive(Debug, Default)]
pub struct SourceSequencer {
    latest: BTreeMap<String, u64>,
}

impl SourceSequencer {
    /// Issues a ticket that supersedes every earlier one for `source_name`.
    pub fn issue(&mut self, source_name: &str) -> Ticket {
        let generation = self.latest.entry(source_name.to_string()).or_insert(0);
        *generation += 1;
        Ticket {
            source_name: source_name.to_string(),
            generation: *generation,
        }
    }

    /// Returns `true` if no newer ticket exists for the ticket's source.
    #[must_use]
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest.get(&ticket.source_name) == Some(&ticket.generation)
    }
}

/// Result of a reconcile or clear request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The surface now shows exactly the requested layers.
    Applied {
        /// Layers added.
        added: usize,
        /// Layers removed beforehand.
        removed: usize,
    },
    /// A newer pass exists for the source; the surface was not touched.
    Superseded,
}

/// Keeps a rendering surface in sync with the latest layer set per source.
#[derive(Debug, Default)]
pub struct Reconciler {
    sequencer: SourceSequencer,
    rendered: BTreeMap<String, BTreeSet<String>>,
}

impl Reconciler {
    /// Creates a reconciler with an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a pass for `source_name`, superseding any pass in flight.
    pub fn issue(&mut self, source_name: &str) -> Ticket {
        self.sequencer.issue(source_name)
    }

    /// Returns `true` if `ticket` is the latest for its source.
    #[must_use]
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.sequencer.is_current(ticket)
    }

    /// Layers this reconciler has placed for `source_name`.
    pub fn rendered_layers(&self, source_name: &str) -> impl Iterator<Item = &str> {
        self.rendered
            .get(source_name)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Replaces the source's data and layers with `layers`.
    ///
    /// Every layer placed by an earlier pass for this source is removed
    /// first, together with any layer the surface already has under one of
    /// the new names. The data source is then re-registered and the layers
    /// are added in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Surface`] if the surface rejects an
    /// operation. Layers added before the failure stay recorded so the next
    /// pass removes them.
    pub fn reconcile<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        ticket: &Ticket,
        source: GeoJsonSourceSpec,
        layers: &[LayerDescriptor],
    ) -> Result<Outcome, ReconcileError> {
        if !self.is_current(ticket) {
            log::debug!(
                "{}: dropping superseded pass {}",
                ticket.source_name,
                ticket.generation
            );
            return Ok(Outcome::Superseded);
        }
        let source_name = ticket.source_name.as_str();

        let mut stale = self.rendered.remove(source_name).unwrap_or_default();
        stale.extend(layers.iter().map(|l| l.layer_name.clone()));
        let removed = self.remove_layers(surface, source_name, stale)?;

        if surface.has_source(source_name) {
            surface.remove_source(source_name)?;
        }
        surface.add_source(source_name, source)?;

        let placed = self.rendered.entry(source_name.to_string()).or_default();
        for descriptor in layers {
            surface.add_layer(LayerSpec::from_descriptor(descriptor, source_name))?;
            placed.insert(descriptor.layer_name.clone());
        }

        log::debug!(
            "{source_name}: pass {} added {} layers, removed {removed}",
            ticket.generation,
            layers.len()
        );

        Ok(Outcome::Applied {
            added: layers.len(),
            removed,
        })
    }

    /// Removes every layer placed for the ticket's source, leaving the data
    /// source registered.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Surface`] if a removal fails.
    pub fn clear<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        ticket: &Ticket,
    ) -> Result<Outcome, ReconcileError> {
        if !self.is_current(ticket) {
            return Ok(Outcome::Superseded);
        }
        let source_name = ticket.source_name.as_str();
        let stale = self.rendered.remove(source_name).unwrap_or_default();
        let removed = self.remove_layers(surface, source_name, stale)?;
        log::debug!("{source_name}: cleared {removed} layers");
        Ok(Outcome::Applied { added: 0, removed })
    }

    /// Removes every layer placed for the ticket's source, then the data
    /// source itself.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Surface`] if a removal fails.
    pub fn retire<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        ticket: &Ticket,
    ) -> Result<Outcome, ReconcileError> {
        let outcome = self.clear(surface, ticket)?;
        if matches!(outcome, Outcome::Applied { .. }) && surface.has_source(&ticket.source_name) {
            surface.remove_source(&ticket.source_name)?;
        }
        Ok(outcome)
    }

    fn remove_layers<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        source_name: &str,
        names: BTreeSet<String>,
    ) -> Result<usize, ReconcileError> {
        let mut removed = 0;
        let mut pending = names.into_iter();
        while let Some(name) = pending.next() {
            if !surface.has_layer(&name) {
                continue;
            }
            if let Err(e) = surface.remove_layer(&name) {
                let left: BTreeSet<String> = std::iter::once(name)
                    .chain(pending)
                    .filter(|n| surface.has_layer(n))
                    .collect();
                self.rendered.insert(source_name.to_string(), left);
                return Err(e.into());
            }
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use ecosensor_layer_models::{GeometryKind, OVERLAY_OPACITY, PaintSpec, RenderKind};
    use serde_json::json;

    use super::*;
    use crate::surface::StyleDocument;

    const SOURCE: &str = "ecoSensor_siena_0";

    fn descriptor(id: i64) -> LayerDescriptor {
        LayerDescriptor {
            layer_name: ecosensor_layer_models::layer_name(SOURCE, id),
            feature_id: id,
            render_kind: RenderKind::Fill,
            paint: PaintSpec::Fill {
                fill_color: "#50CCAA".to_string(),
                fill_opacity: OVERLAY_OPACITY,
            },
            geometry_kind: GeometryKind::Polygon,
            selected_reading: None,
        }
    }

    fn data() -> GeoJsonSourceSpec {
        GeoJsonSourceSpec::new(json!({ "type": "FeatureCollection", "features": [] }))
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut doc = StyleDocument::new();
        let mut reconciler = Reconciler::new();
        let layers = [descriptor(1), descriptor(2)];

        let first = reconciler.issue(SOURCE);
        reconciler.reconcile(&mut doc, &first, data(), &layers).unwrap();
        let after_first: Vec<String> = doc.layer_names().into_iter().map(String::from).collect();

        let second = reconciler.issue(SOURCE);
        let outcome = reconciler.reconcile(&mut doc, &second, data(), &layers).unwrap();

        assert_eq!(outcome, Outcome::Applied { added: 2, removed: 2 });
        assert_eq!(doc.layer_names(), after_first);
        assert_eq!(doc.source_names().count(), 1);
    }

    #[test]
    fn superseded_ticket_leaves_surface_untouched() {
        let mut doc = StyleDocument::new();
        let mut reconciler = Reconciler::new();

        let older = reconciler.issue(SOURCE);
        let newer = reconciler.issue(SOURCE);
        assert!(!reconciler.is_current(&older));

        reconciler
            .reconcile(&mut doc, &newer, data(), &[descriptor(1)])
            .unwrap();
        let outcome = reconciler
            .reconcile(&mut doc, &older, data(), &[descriptor(2), descriptor(3)])
            .unwrap();

        assert_eq!(outcome, Outcome::Superseded);
        assert_eq!(doc.layer_names(), ["ecoSensor_siena_0_1"]);
        assert_eq!(
            reconciler.clear(&mut doc, &older).unwrap(),
            Outcome::Superseded
        );
        assert!(doc.has_layer("ecoSensor_siena_0_1"));
    }

    #[test]
    fn layers_for_vanished_features_are_removed() {
        let mut doc = StyleDocument::new();
        let mut reconciler = Reconciler::new();

        let ticket = reconciler.issue(SOURCE);
        reconciler
            .reconcile(&mut doc, &ticket, data(), &[descriptor(1), descriptor(2), descriptor(3)])
            .unwrap();

        let ticket = reconciler.issue(SOURCE);
        reconciler
            .reconcile(&mut doc, &ticket, data(), &[descriptor(2)])
            .unwrap();

        assert_eq!(doc.layer_names(), ["ecoSensor_siena_0_2"]);
        let ledger: Vec<&str> = reconciler.rendered_layers(SOURCE).collect();
        assert_eq!(ledger, ["ecoSensor_siena_0_2"]);
    }

    #[test]
    fn sources_are_independent() {
        let mut doc = StyleDocument::new();
        let mut reconciler = Reconciler::new();

        let a = reconciler.issue(SOURCE);
        let b = reconciler.issue("ecoSensor_gioia_0");
        assert!(reconciler.is_current(&a));
        assert_eq!(b.generation(), 1);

        reconciler.reconcile(&mut doc, &a, data(), &[descriptor(1)]).unwrap();
        reconciler.reconcile(&mut doc, &b, data(), &[]).unwrap();
        assert_eq!(doc.source_names().count(), 2);
        assert!(doc.has_layer("ecoSensor_siena_0_1"));
    }

    #[test]
    fn clear_removes_recorded_layers() {
        let mut doc = StyleDocument::new();
        let mut reconciler = Reconciler::new();

        let ticket = reconciler.issue(SOURCE);
        reconciler
            .reconcile(&mut doc, &ticket, data(), &[descriptor(1), descriptor(2)])
            .unwrap();

        let ticket = reconciler.issue(SOURCE);
        let outcome = reconciler.clear(&mut doc, &ticket).unwrap();
        assert_eq!(outcome, Outcome::Applied { added: 0, removed: 2 });
        assert!(doc.layer_names().is_empty());
        assert_eq!(reconciler.rendered_layers(SOURCE).count(), 0);
    }

    #[test]
    fn retire_removes_layers_and_source() {
        let mut doc = StyleDocument::new();
        let mut reconciler = Reconciler::new();

        let ticket = reconciler.issue(SOURCE);
        reconciler
            .reconcile(&mut doc, &ticket, data(), &[descriptor(1)])
            .unwrap();
        let other = reconciler.issue("ecoSensor_gioia_0");
        reconciler
            .reconcile(&mut doc, &other, data(), &[])
            .unwrap();

        let ticket = reconciler.issue(SOURCE);
        let outcome = reconciler.retire(&mut doc, &ticket).unwrap();
        assert_eq!(outcome, Outcome::Applied { added: 0, removed: 1 });
        assert!(doc.layer_names().is_empty());
        assert_eq!(doc.source_names().collect::<Vec<_>>(), ["ecoSensor_gioia_0"]);
    }

    #[test]
    fn failed_add_keeps_partial_ledger() {
        let mut doc = StyleDocument::new();
        let mut reconciler = Reconciler::new();

        let ticket = reconciler.issue(SOURCE);
        let err = reconciler
            .reconcile(&mut doc, &ticket, data(), &[descriptor(1), descriptor(1)])
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Surface(SurfaceError::DuplicateLayer(_))
        ));

        let ledger: Vec<&str> = reconciler.rendered_layers(SOURCE).collect();
        assert_eq!(ledger, ["ecoSensor_siena_0_1"]);

        let ticket = reconciler.issue(SOURCE);
        reconciler.reconcile(&mut doc, &ticket, data(), &[]).unwrap();
        assert!(doc.layer_names().is_empty());
    }
}
