#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetch-to-surface orchestration.
//!
//! A pass for one dataset has three steps:
//!
//! 1. [`Pipeline::begin`] issues a ticket for the dataset's source name,
//!    aborts any fetch still running for it, and returns a [`PendingFetch`].
//! 2. [`PendingFetch::run`] performs the fetch. It borrows neither the
//!    pipeline nor the surface, so many can run concurrently.
//! 3. [`Pipeline::complete`] builds the layer set and reconciles it onto
//!    the surface, unless a newer pass for the same source exists.
//!
//! [`Pipeline::refresh_all`] runs all three for every dataset in view as
//! an unordered fan-out.

pub mod context;
pub mod source;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ecosensor_fetch::FetchError;
use ecosensor_layer::viewport::entries_in_viewport;
use ecosensor_layer::{
    CategoryFilter, ColorRamp, LayerSetBuilder, Outcome, ReconcileError, Reconciler,
    RenderSurface, StepRamp, Ticket,
};
use ecosensor_layer_models::GeoJsonSourceSpec;
use ecosensor_schema::{FeatureCollection, SchemaMode, SchemaNormalizer};
use ecosensor_sensor_models::SourceEntry;
use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture};
use futures::stream::FuturesUnordered;
use futures::{FutureExt as _, StreamExt as _};

pub use context::{StaticContext, ViewContext};
pub use source::CollectionSource;

/// Why a dataset rendered nothing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The collection could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The collection could not be re-encoded as source data.
    #[error("failed to encode source data: {0}")]
    Encode(#[from] serde_json::Error),

    /// The surface rejected the new layer set.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// How one pass for a dataset ended.
#[derive(Debug)]
pub enum SourceOutcome {
    /// The surface now shows this pass's layers.
    Rendered {
        /// Layers placed.
        layers: usize,
        /// Layers from the previous pass that were removed.
        removed: usize,
        /// Features skipped because of schema or geometry problems.
        skipped: usize,
    },
    /// Nothing could be rendered; the source's previous layers are gone.
    Failed(PipelineError),
    /// A newer pass for the same source exists; the surface is untouched.
    Superseded,
    /// The fetch was cancelled; the surface is untouched.
    Cancelled,
}

/// The outcome of one pass, tagged with its source name.
#[derive(Debug)]
pub struct SourceReport {
    /// Rendering source name of the dataset.
    pub source_name: String,
    /// What happened.
    pub outcome: SourceOutcome,
}

/// A started pass whose fetch has not run yet.
pub struct PendingFetch {
    ticket: Ticket,
    filter: CategoryFilter,
    now: DateTime<Utc>,
    fetch: Abortable<BoxFuture<'static, Result<FeatureCollection, FetchError>>>,
}

impl std::fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFetch")
            .field("ticket", &self.ticket)
            .field("filter", &self.filter)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl PendingFetch {
    /// The ticket this pass holds.
    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    /// Runs the fetch to completion or cancellation.
    pub async fn run(self) -> FetchCompletion {
        let result = self.fetch.await;
        FetchCompletion {
            ticket: self.ticket,
            filter: self.filter,
            now: self.now,
            result,
        }
    }
}

/// A finished fetch waiting to be applied with [`Pipeline::complete`].
#[derive(Debug)]
pub struct FetchCompletion {
    ticket: Ticket,
    filter: CategoryFilter,
    now: DateTime<Utc>,
    result: Result<Result<FeatureCollection, FetchError>, Aborted>,
}

impl FetchCompletion {
    /// The ticket this pass holds.
    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        &self.ticket
    }
}

/// Turns datasets into layers on a [`RenderSurface`].
pub struct Pipeline {
    source: Arc<dyn CollectionSource>,
    normalizer: SchemaNormalizer,
    ramp: Arc<dyn ColorRamp>,
    reconciler: Reconciler,
    in_flight: BTreeMap<String, (u64, AbortHandle)>,
    prefix: String,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("normalizer", &self.normalizer)
            .field("reconciler", &self.reconciler)
            .field("in_flight", &self.in_flight.keys().collect::<Vec<_>>())
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline reading `mode`-shaped collections from `source`
    /// and naming sources `{prefix}_{entityKey}_{kindCode}`.
    #[must_use]
    pub fn new(source: Arc<dyn CollectionSource>, mode: SchemaMode, prefix: &str) -> Self {
        Self {
            source,
            normalizer: SchemaNormalizer::new(mode),
            ramp: Arc::new(StepRamp::default()),
            reconciler: Reconciler::new(),
            in_flight: BTreeMap::new(),
            prefix: prefix.to_string(),
        }
    }

    /// Replaces the fallback color ramp.
    #[must_use]
    pub fn with_ramp(mut self, ramp: Arc<dyn ColorRamp>) -> Self {
        self.ramp = ramp;
        self
    }

    /// Returns the rendering source name for `entry`.
    #[must_use]
    pub fn source_name(&self, entry: &SourceEntry) -> String {
        entry.source_name(&self.prefix)
    }

    /// Returns the reconciler and its ledger of placed layers.
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Number of fetches started and not yet completed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Starts a pass for `entry` under the filter and clock of `ctx`.
    ///
    /// Any fetch still running for the same source is aborted, and its
    /// completion will report [`SourceOutcome::Superseded`].
    pub fn begin(&mut self, entry: &SourceEntry, ctx: &dyn ViewContext) -> PendingFetch {
        let source_name = self.source_name(entry);
        let ticket = self.reconciler.issue(&source_name);

        if let Some((generation, handle)) = self.in_flight.remove(&source_name) {
            log::debug!("{source_name}: aborting pass {generation}");
            handle.abort();
        }

        let filter = ctx.active_filter();
        let pollutant = filter.pollutant();
        let source = Arc::clone(&self.source);
        let entry = entry.clone();
        let fetch = async move { source.fetch_collection(&entry, pollutant).await }.boxed();
        let (fetch, handle) = futures::future::abortable(fetch);

        self.in_flight
            .insert(source_name, (ticket.generation(), handle));

        PendingFetch {
            ticket,
            filter,
            now: ctx.now(),
            fetch,
        }
    }

    /// Aborts every running fetch. Their completions report
    /// [`SourceOutcome::Cancelled`] and leave the surface as it is.
    pub fn cancel_all(&mut self) {
        for (source_name, (generation, handle)) in std::mem::take(&mut self.in_flight) {
            log::debug!("{source_name}: cancelling pass {generation}");
            handle.abort();
        }
    }

    /// Withdraws `entry` from `surface`.
    ///
    /// A fetch still running for it is aborted and superseded, and its
    /// layers and data source are removed. Returns the number of layers
    /// removed.
    pub fn retire<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        entry: &SourceEntry,
    ) -> usize {
        let source_name = self.source_name(entry);
        let running = self.in_flight.remove(&source_name);
        let placed = self.reconciler.rendered_layers(&source_name).next().is_some();
        if running.is_none() && !placed && !surface.has_source(&source_name) {
            return 0;
        }
        if let Some((generation, handle)) = running {
            log::debug!("{source_name}: aborting pass {generation}");
            handle.abort();
        }

        let ticket = self.reconciler.issue(&source_name);
        match self.reconciler.retire(surface, &ticket) {
            Ok(Outcome::Applied { removed, .. }) => {
                log::info!("{source_name}: out of view, removed {removed} layers");
                removed
            }
            Ok(Outcome::Superseded) => 0,
            Err(e) => {
                log::error!("{source_name}: failed to retire: {e}");
                0
            }
        }
    }

    /// Applies a finished fetch to `surface`.
    ///
    /// A failed fetch removes the source's previous layers so a broken
    /// dataset shows no overlay instead of an outdated one.
    pub fn complete<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        completion: FetchCompletion,
    ) -> SourceReport {
        let FetchCompletion {
            ticket,
            filter,
            now,
            result,
        } = completion;
        let source_name = ticket.source_name().to_string();

        if self
            .in_flight
            .get(&source_name)
            .is_some_and(|(generation, _)| *generation == ticket.generation())
        {
            self.in_flight.remove(&source_name);
        }

        let outcome = if self.reconciler.is_current(&ticket) {
            match result {
                Err(Aborted) => {
                    log::debug!("{source_name}: fetch cancelled");
                    SourceOutcome::Cancelled
                }
                Ok(Err(e)) => {
                    self.release(surface, &ticket);
                    SourceOutcome::Failed(e.into())
                }
                Ok(Ok(collection)) => self
                    .render(surface, &ticket, &collection, filter, now)
                    .unwrap_or_else(|e| {
                        log::error!("{source_name}: failed to render: {e}");
                        SourceOutcome::Failed(e)
                    }),
            }
        } else {
            log::debug!(
                "{source_name}: pass {} superseded before completion",
                ticket.generation()
            );
            SourceOutcome::Superseded
        };

        SourceReport {
            source_name,
            outcome,
        }
    }

    /// Runs a pass for every entry inside the context's viewport and
    /// applies each as soon as its fetch finishes. Entries outside the
    /// viewport are retired.
    ///
    /// Completions arrive in any order. A failing dataset does not affect
    /// the others.
    pub async fn refresh_all<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        entries: &[SourceEntry],
        ctx: &dyn ViewContext,
    ) -> Vec<SourceReport> {
        let viewport = ctx.viewport();
        let in_view = entries_in_viewport(entries, viewport.as_ref());
        self.retire_outside(surface, entries, &in_view);

        let mut running: FuturesUnordered<_> = in_view
            .into_iter()
            .map(|entry| self.begin(entry, ctx).run())
            .collect();

        let mut reports = Vec::with_capacity(running.len());
        while let Some(completion) = running.next().await {
            reports.push(self.complete(surface, completion));
        }
        reports
    }

    /// Retires every entry of `entries` whose source is not in `in_view`.
    pub fn retire_outside<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        entries: &[SourceEntry],
        in_view: &[&SourceEntry],
    ) {
        let keep: BTreeSet<String> = in_view.iter().map(|e| self.source_name(e)).collect();
        for entry in entries {
            if !keep.contains(&self.source_name(entry)) {
                self.retire(surface, entry);
            }
        }
    }

    fn render<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        ticket: &Ticket,
        collection: &FeatureCollection,
        filter: CategoryFilter,
        now: DateTime<Utc>,
    ) -> Result<SourceOutcome, PipelineError> {
        let source_name = ticket.source_name();
        let builder = LayerSetBuilder::new(self.normalizer, self.ramp.as_ref());
        let set = builder.build(collection, source_name, filter, now);
        let data = GeoJsonSourceSpec::new(builder.with_feature_ids(collection).to_value()?);

        match self.reconciler.reconcile(surface, ticket, data, &set.layers)? {
            Outcome::Applied { added, removed } => {
                log::info!(
                    "{source_name}: rendered {added} layers ({} features skipped)",
                    set.failures.len()
                );
                Ok(SourceOutcome::Rendered {
                    layers: added,
                    removed,
                    skipped: set.failures.len(),
                })
            }
            Outcome::Superseded => Ok(SourceOutcome::Superseded),
        }
    }

    fn release<S: RenderSurface + ?Sized>(&mut self, surface: &mut S, ticket: &Ticket) {
        match self.reconciler.clear(surface, ticket) {
            Ok(Outcome::Applied { removed, .. }) if removed > 0 => {
                log::info!("{}: removed {removed} outdated layers", ticket.source_name());
            }
            Ok(_) => {}
            Err(e) => log::error!("{}: failed to clear layers: {e}", ticket.source_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone as _};
    use ecosensor_layer::{BoundingBox, StyleDocument};
    use ecosensor_schema::RawFeature;
    use ecosensor_sensor_models::Pollutant;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct StubSource {
        collections: Mutex<BTreeMap<String, FeatureCollection>>,
    }

    impl StubSource {
        fn set(&self, key: &str, collection: FeatureCollection) {
            self.collections
                .lock()
                .unwrap()
                .insert(key.to_string(), collection);
        }

        fn remove(&self, key: &str) {
            self.collections.lock().unwrap().remove(key);
        }
    }

    #[async_trait]
    impl CollectionSource for StubSource {
        async fn fetch_collection(
            &self,
            entry: &SourceEntry,
            _pollutant: Option<Pollutant>,
        ) -> Result<FeatureCollection, FetchError> {
            self.collections
                .lock()
                .unwrap()
                .get(&entry.entity_key)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: format!("stub://{}", entry.entity_key),
                    status: 404,
                })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn ctx() -> StaticContext {
        StaticContext::new(CategoryFilter::Pollutant(Pollutant::Pm25)).at(now())
    }

    fn entry(key: &str, extent: Option<[f64; 4]>) -> SourceEntry {
        serde_json::from_value(json!({
            "entityKey": key,
            "center": [11.33, 43.32],
            "extent": extent
        }))
        .unwrap()
    }

    fn feature(id: i64, aqi: f64, minutes: i64) -> RawFeature {
        RawFeature::new(
            geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
                vec![11.0, 43.0],
                vec![11.1, 43.0],
                vec![11.1, 43.1],
                vec![11.0, 43.0],
            ]])),
            json!([
                { "key": "OSM", "value": { "type": "way", "id": id } },
                { "key": "Data", "value": [{
                    "date": (now() + TimeDelta::minutes(minutes)).to_rfc3339(),
                    "europeanAqi": aqi,
                    "pollution": 2
                }]}
            ]),
        )
    }

    fn setup() -> (Arc<StubSource>, Pipeline) {
        let stub = Arc::new(StubSource::default());
        let pipeline = Pipeline::new(
            Arc::clone(&stub) as Arc<dyn CollectionSource>,
            SchemaMode::PairArray,
            "ecoSensor",
        );
        (stub, pipeline)
    }

    #[tokio::test]
    async fn renders_current_features_in_aqi_order() {
        let (stub, mut pipeline) = setup();
        stub.set(
            "siena",
            FeatureCollection::new(vec![feature(1, 50.0, 10), feature(2, 20.0, 20), feature(3, 90.0, -5)]),
        );
        let mut doc = StyleDocument::new();

        let pending = pipeline.begin(&entry("siena", None), &ctx());
        let report = pipeline.complete(&mut doc, pending.run().await);

        assert_eq!(report.source_name, "ecoSensor_siena_0");
        assert!(matches!(
            report.outcome,
            SourceOutcome::Rendered { layers: 2, removed: 0, skipped: 0 }
        ));
        assert_eq!(doc.layer_names(), ["ecoSensor_siena_0_2", "ecoSensor_siena_0_1"]);
        assert!(doc.has_source("ecoSensor_siena_0"));
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[tokio::test]
    async fn each_layer_filters_to_its_own_feature() {
        let (stub, mut pipeline) = setup();
        stub.set(
            "siena",
            FeatureCollection::new(vec![feature(1, 50.0, 10), feature(2, 20.0, 20)]),
        );
        let mut doc = StyleDocument::new();

        let pending = pipeline.begin(&entry("siena", None), &ctx());
        pipeline.complete(&mut doc, pending.run().await);

        let data = &doc.source("ecoSensor_siena_0").unwrap().data;
        let ids: Vec<_> = data["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].clone())
            .collect();
        assert_eq!(ids, [json!(1), json!(2)]);

        let filters: Vec<_> = doc.layers().iter().map(|l| l.filter.clone()).collect();
        assert_eq!(
            filters,
            [Some(json!(["==", ["id"], 2])), Some(json!(["==", ["id"], 1]))]
        );
    }

    #[tokio::test]
    async fn older_pass_is_superseded_by_newer_one() {
        let (stub, mut pipeline) = setup();
        stub.set("siena", FeatureCollection::new(vec![feature(1, 50.0, 10)]));
        let mut doc = StyleDocument::new();
        let siena = entry("siena", None);

        let older = pipeline.begin(&siena, &ctx());
        let newer = pipeline.begin(&siena, &ctx());

        let report = pipeline.complete(&mut doc, newer.run().await);
        assert!(matches!(report.outcome, SourceOutcome::Rendered { .. }));

        let report = pipeline.complete(&mut doc, older.run().await);
        assert!(matches!(report.outcome, SourceOutcome::Superseded));
        assert_eq!(doc.layer_names(), ["ecoSensor_siena_0_1"]);
    }

    #[tokio::test]
    async fn fetch_failure_clears_previous_layers() {
        let (stub, mut pipeline) = setup();
        stub.set("siena", FeatureCollection::new(vec![feature(1, 50.0, 10)]));
        let mut doc = StyleDocument::new();
        let siena = entry("siena", None);

        let pending = pipeline.begin(&siena, &ctx());
        pipeline.complete(&mut doc, pending.run().await);
        assert_eq!(doc.layer_names().len(), 1);

        stub.remove("siena");
        let pending = pipeline.begin(&siena, &ctx());
        let report = pipeline.complete(&mut doc, pending.run().await);

        assert!(matches!(
            report.outcome,
            SourceOutcome::Failed(PipelineError::Fetch(FetchError::Status { status: 404, .. }))
        ));
        assert!(doc.layer_names().is_empty());
    }

    #[tokio::test]
    async fn cancelled_fetch_leaves_surface_untouched() {
        let (stub, mut pipeline) = setup();
        stub.set("siena", FeatureCollection::new(vec![feature(1, 50.0, 10)]));
        let mut doc = StyleDocument::new();

        let pending = pipeline.begin(&entry("siena", None), &ctx());
        pipeline.cancel_all();
        let report = pipeline.complete(&mut doc, pending.run().await);

        assert!(matches!(report.outcome, SourceOutcome::Cancelled));
        assert!(doc.layer_names().is_empty());
        assert!(!doc.has_source("ecoSensor_siena_0"));
    }

    #[tokio::test]
    async fn refresh_skips_entries_outside_viewport_and_isolates_failures() {
        let (stub, mut pipeline) = setup();
        stub.set("siena", FeatureCollection::new(vec![feature(1, 50.0, 10)]));
        stub.set("gioia", FeatureCollection::new(vec![feature(2, 50.0, 10)]));
        let entries = [
            entry("siena", Some([11.2, 43.2, 11.4, 43.4])),
            entry("gioia", Some([16.8, 40.7, 17.0, 40.9])),
            entry("missing", None),
        ];
        let context = ctx().with_viewport(Some(BoundingBox::new(11.0, 43.0, 12.0, 44.0)));
        let mut doc = StyleDocument::new();

        let mut reports = pipeline.refresh_all(&mut doc, &entries, &context).await;
        reports.sort_by(|a, b| a.source_name.cmp(&b.source_name));

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].source_name, "ecoSensor_missing_0");
        assert!(matches!(reports[0].outcome, SourceOutcome::Failed(_)));
        assert!(matches!(reports[1].outcome, SourceOutcome::Rendered { layers: 1, .. }));
        assert_eq!(doc.layer_names(), ["ecoSensor_siena_0_1"]);
    }

    #[tokio::test]
    async fn panning_away_retires_previously_rendered_datasets() {
        let (stub, mut pipeline) = setup();
        stub.set("siena", FeatureCollection::new(vec![feature(1, 50.0, 10)]));
        stub.set("gioia", FeatureCollection::new(vec![feature(2, 50.0, 10)]));
        let entries = [
            entry("siena", Some([11.2, 43.2, 11.4, 43.4])),
            entry("gioia", Some([16.8, 40.7, 17.0, 40.9])),
        ];
        let mut doc = StyleDocument::new();

        pipeline.refresh_all(&mut doc, &entries, &ctx()).await;
        assert_eq!(doc.layer_names().len(), 2);

        let apulia = ctx().with_viewport(Some(BoundingBox::new(16.0, 40.0, 18.0, 41.0)));
        let reports = pipeline.refresh_all(&mut doc, &entries, &apulia).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(doc.layer_names(), ["ecoSensor_gioia_0_2"]);
        assert_eq!(doc.source_names().collect::<Vec<_>>(), ["ecoSensor_gioia_0"]);
        assert_eq!(pipeline.reconciler().rendered_layers("ecoSensor_siena_0").count(), 0);
    }

    #[tokio::test]
    async fn retire_supersedes_a_running_fetch() {
        let (stub, mut pipeline) = setup();
        stub.set("siena", FeatureCollection::new(vec![feature(1, 50.0, 10)]));
        let mut doc = StyleDocument::new();
        let siena = entry("siena", None);

        let pending = pipeline.begin(&siena, &ctx());
        pipeline.retire(&mut doc, &siena);
        let report = pipeline.complete(&mut doc, pending.run().await);

        assert!(matches!(report.outcome, SourceOutcome::Superseded));
        assert!(doc.layer_names().is_empty());
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[tokio::test]
    async fn later_pass_drops_layers_that_stopped_qualifying() {
        let (stub, mut pipeline) = setup();
        stub.set(
            "siena",
            FeatureCollection::new(vec![feature(1, 50.0, 10), feature(2, 30.0, 50)]),
        );
        let mut doc = StyleDocument::new();
        let siena = entry("siena", None);

        let pending = pipeline.begin(&siena, &ctx());
        pipeline.complete(&mut doc, pending.run().await);
        assert_eq!(doc.layer_names().len(), 2);

        let later = ctx().at(now() + TimeDelta::minutes(30));
        let pending = pipeline.begin(&siena, &later);
        let report = pipeline.complete(&mut doc, pending.run().await);

        assert!(matches!(
            report.outcome,
            SourceOutcome::Rendered { layers: 1, removed: 2, .. }
        ));
        assert_eq!(doc.layer_names(), ["ecoSensor_siena_0_2"]);
    }
}
