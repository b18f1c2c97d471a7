//! Per-glacier orchestration: query the catalog, provision the folder,
//! dispatch exports and log the result, with bounded retry and a cap on the
//! number of glaciers in flight.
mod retry;

pub use retry::RetryPolicy;

use std::cell::Cell;
use std::fmt;

use futures_util::stream::{self, StreamExt};

use crate::catalog::CatalogIndex;
use crate::config::RunConfig;
use crate::drive::{FolderApi, FolderDirectory};
use crate::error::{Error, Result};
use crate::extraction_log::{ExtractionLog, ExtractionLogRow};
use crate::imagery::{DateRange, DispatchFlags, DispatchReport, Dispatcher, ExportService, ImageryCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlacierState {
    Pending,
    Queried,
    FolderReady,
    Dispatched,
    Logged,
}

impl fmt::Display for GlacierState {
    fn fmt(self: &Self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Queried => "queried",
            Self::FolderReady => "folder ready",
            Self::Dispatched => "dispatched",
            Self::Logged => "logged",
        };
        write!(f, "{name}")
    }
}

/// What happened to one glacier. `state` is the furthest state reached by
/// the last attempt.
#[derive(Debug)]
pub struct GlacierOutcome {
    pub id: String,
    pub state: GlacierState,
    pub attempts: u32,
    pub report: Option<DispatchReport>,
    pub error: Option<Error>,
}

impl GlacierOutcome {
    pub fn is_success(self: &Self) -> bool {
        self.state == GlacierState::Logged
    }
}

/// Outcomes in input order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<GlacierOutcome>,
}

impl RunSummary {
    pub fn succeeded(self: &Self) -> Vec<&GlacierOutcome> {
        self.outcomes.iter().filter(|o| o.is_success()).collect()
    }

    pub fn failed(self: &Self) -> Vec<&GlacierOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub folder_name: String,
    pub range: DateRange,
    pub cloud_tol: f64,
    pub flags: DispatchFlags,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl RunSettings {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Ok(Self {
            folder_name: config.folder_name.clone(),
            range: config.extraction.range()?,
            cloud_tol: config.extraction.cloud_tol,
            flags: config.extraction.flags,
            max_concurrent: config.max_concurrent.max(1),
            retry: RetryPolicy::from_settings(&config.retry),
        })
    }
}

pub struct Pipeline<'a, A: FolderApi, C: ImageryCatalog, E: ExportService> {
    catalog: &'a CatalogIndex,
    directory: &'a FolderDirectory<A>,
    dispatcher: &'a Dispatcher<C, E>,
    log: &'a ExtractionLog,
    settings: RunSettings,
}

impl<'a, A, C, E> Pipeline<'a, A, C, E>
where
    A: FolderApi,
    C: ImageryCatalog,
    E: ExportService,
{
    pub fn new(
        catalog: &'a CatalogIndex,
        directory: &'a FolderDirectory<A>,
        dispatcher: &'a Dispatcher<C, E>,
        log: &'a ExtractionLog,
        settings: RunSettings,
    ) -> Self {
        Self {
            catalog,
            directory,
            dispatcher,
            log,
            settings,
        }
    }

    /// Process every identifier. A glacier that fails is recorded and the
    /// batch moves on; an authentication failure stops the batch and is
    /// returned as the error.
    pub async fn run<S: AsRef<str>>(self: &Self, ids: &[S]) -> Result<RunSummary> {
        let folder_name = self.settings.folder_name.as_str();
        let (parent, _) = self
            .settings
            .retry
            .retry(folder_name, |_| self.directory.get_or_create(folder_name, None))
            .await;
        let parent = parent?;
        log::info!(
            "Processing {} glaciers into '{}' ({}), {} at a time",
            ids.len(),
            folder_name,
            parent,
            self.settings.max_concurrent
        );

        let mut outcomes = stream::iter(ids)
            .map(|id| self.process(id.as_ref(), &parent))
            .buffered(self.settings.max_concurrent.max(1));

        let mut summary = RunSummary::default();
        while let Some(mut outcome) = outcomes.next().await {
            if outcome.error.as_ref().is_some_and(Error::is_fatal) {
                log::error!("{}: authentication failed, stopping the run", outcome.id);
                if let Some(e) = outcome.error.take() {
                    return Err(e);
                }
            }
            summary.outcomes.push(outcome);
        }

        log::info!(
            "Run finished: {} logged, {} failed",
            summary.succeeded().len(),
            summary.failed().len()
        );
        Ok(summary)
    }

    async fn process(self: &Self, id: &str, parent: &str) -> GlacierOutcome {
        log::info!("Beginning glacier {id}");
        let state = Cell::new(GlacierState::Pending);
        let (result, attempts) = self
            .settings
            .retry
            .retry(id, |_| self.attempt(id, parent, &state))
            .await;

        match result {
            Ok(report) => {
                log::info!(
                    "{id}: logged {} scenes, {} jobs submitted",
                    report.scene_count(),
                    report.jobs.len()
                );
                GlacierOutcome {
                    id: id.to_string(),
                    state: state.get(),
                    attempts,
                    report: Some(report),
                    error: None,
                }
            }
            Err(e) => {
                log::error!("{id}: failed while {} after {attempts} attempts: {e}", state.get());
                GlacierOutcome {
                    id: id.to_string(),
                    state: state.get(),
                    attempts,
                    report: None,
                    error: Some(e),
                }
            }
        }
    }

    /// One pass from `Pending` to `Logged`.
    async fn attempt(
        self: &Self,
        id: &str,
        parent: &str,
        state: &Cell<GlacierState>,
    ) -> Result<DispatchReport> {
        state.set(GlacierState::Pending);

        let record = self.catalog.query(id)?;
        state.set(GlacierState::Queried);

        let folder_id = self.directory.get_or_create(id, Some(parent)).await?;
        state.set(GlacierState::FolderReady);

        let report = self
            .dispatcher
            .dispatch(
                &record,
                &folder_id,
                &self.settings.range,
                self.settings.cloud_tol,
                &self.settings.flags,
            )
            .await?;
        state.set(GlacierState::Dispatched);

        self.log
            .append(&ExtractionLogRow::new(&record, &report, &folder_id)?)?;
        state.set(GlacierState::Logged);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagery::Sensor;
    use crate::mock::{self, MockCatalog, MockDrive, MockExports};
    use std::time::Duration;
    use tokio::time::Instant;

    fn settings() -> RunSettings {
        RunSettings {
            folder_name: "glaciers".to_string(),
            range: DateRange::parse("2015-01-01", "2016-01-01").unwrap(),
            cloud_tol: 20.0,
            flags: DispatchFlags {
                imagery: true,
                regional_dem: false,
                high_res_dem: false,
                coarse_dem_only: false,
            },
            max_concurrent: 1,
            retry: RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(20), 5),
        }
    }

    struct Fixture {
        catalog: CatalogIndex,
        drive: MockDrive,
        scenes: MockCatalog,
        exports: MockExports,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let scenes = MockCatalog::new();
            scenes.add_scene("landsat-8", "2015-08-14", 12.5);
            scenes.add_scene("landsat-8", "2015-09-15", 45.0);
            scenes.add_scene("landsat-8", "2015-10-01", 3.0);
            scenes.add_scene("landsat-5", "1990-07-14", 1.0);
            Self {
                catalog: mock::catalog(&[
                    ("G1", 10.0, 20.0, 0.01),
                    ("G2", 86.9, 27.9, 0.2),
                    ("G3", -150.3, 61.2, 0.4),
                ]),
                drive: MockDrive::new(),
                scenes,
                exports: MockExports::new(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn log(self: &Self) -> ExtractionLog {
            ExtractionLog::new(self.dir.path().join("glacierInfo.csv"))
        }

        async fn run(self: &Self, ids: &[&str], settings: RunSettings) -> Result<RunSummary> {
            let directory = FolderDirectory::new(&self.drive);
            let dispatcher = Dispatcher::new(&self.scenes, &self.exports, "landsat-c2-l2");
            let log = self.log();
            let pipeline = Pipeline::new(&self.catalog, &directory, &dispatcher, &log, settings);
            pipeline.run(ids).await
        }
    }

    #[tokio::test]
    async fn test_single_glacier_end_to_end() {
        let fixture = Fixture::new();
        let summary = fixture.run(&["G1"], settings()).await.unwrap();

        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.state, GlacierState::Logged);
        assert_eq!(outcome.attempts, 1);

        // Only Landsat 8 operates in 2015
        let searches = fixture.scenes.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].platform, "landsat-8");
        let [min_x, min_y, max_x, max_y] = searches[0].bbox;
        assert!((max_x - min_x - 0.011).abs() < 1e-9);
        assert!((max_y - min_y - 0.011).abs() < 1e-9);
        assert!(((min_x + max_x) / 2.0 - 10.005).abs() < 1e-9);
        assert!(((min_y + max_y) / 2.0 - 20.005).abs() < 1e-9);

        let folders = fixture.drive.folders();
        let parent = folders.iter().find(|f| f.name == "glaciers").unwrap();
        assert_eq!(parent.parents, vec!["root"]);
        let g1 = folders.iter().find(|f| f.name == "G1").unwrap();
        assert_eq!(g1.parents, vec![parent.id.clone()]);

        let submitted: Vec<String> = fixture
            .exports
            .submitted()
            .iter()
            .inspect(|job| {
                assert_eq!(job.folder_name, "G1");
                assert_eq!(job.folder_id, g1.id);
            })
            .map(|job| job.output_name.clone())
            .collect();
        assert_eq!(submitted, vec!["2015-08-14", "2015-10-01"]);

        let rows = fixture.log().read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].glac_id, "G1");
        assert_eq!(rows[0].folder_id, g1.id);
        let logged: Vec<String> = rows[0]
            .dates(Sensor::Landsat8)
            .unwrap()
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(logged, submitted);
        assert!(rows[0].dates(Sensor::Landsat5).unwrap().is_empty());
        assert!(rows[0].dates(Sensor::Landsat7).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_from_pending() {
        let fixture = Fixture::new();
        fixture
            .exports
            .fail_next(Error::from_status("earth engine image:export", 503, ""));
        fixture
            .exports
            .fail_next(Error::from_status("earth engine image:export", 429, ""));

        let started = Instant::now();
        let summary = fixture.run(&["G1"], settings()).await.unwrap();
        let outcome = &summary.outcomes[0];

        assert_eq!(outcome.state, GlacierState::Logged);
        assert_eq!(outcome.attempts, 3);
        assert!(started.elapsed() >= Duration::from_secs(2 + 4));
        // One folder per name despite the restarts
        assert_eq!(fixture.drive.create_calls(), 2);
        assert_eq!(fixture.log().read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_glacier_does_not_stop_the_batch() {
        let fixture = Fixture::new();
        let summary = fixture.run(&["G404", "G1"], settings()).await.unwrap();

        let failed = summary.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "G404");
        assert_eq!(failed[0].state, GlacierState::Pending);
        assert_eq!(failed[0].attempts, 1);
        assert!(failed[0].error.as_ref().unwrap().is_not_found());
        assert_eq!(summary.succeeded()[0].id, "G1");

        // The unknown glacier never reached the remote services
        assert!(fixture.drive.folders().iter().all(|f| f.name != "G404"));
        assert_eq!(fixture.scenes.searches().len(), 1);
    }

    #[tokio::test]
    async fn test_authentication_failure_aborts_the_batch() {
        let fixture = Fixture::new();
        fixture
            .exports
            .fail_next(Error::from_status("earth engine image:export", 401, "expired"));

        let err = fixture.run(&["G1", "G2"], settings()).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!fixture.log().path().exists());
        assert!(fixture.drive.folders().iter().all(|f| f.name != "G2"));
    }

    #[tokio::test]
    async fn test_parent_folder_failure_is_not_retried() {
        let fixture = Fixture::new();
        fixture
            .drive
            .fail_next(Error::from_status("drive files.list", 403, "insufficientPermissions"));

        let err = fixture.run(&["G1"], settings()).await.unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(fixture.drive.list_calls(), 0);
        assert!(fixture.scenes.searches().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_glaciers_report_in_input_order() {
        let fixture = Fixture::new();
        let mut settings = settings();
        settings.max_concurrent = 3;

        let summary = fixture.run(&["G3", "G1", "G2"], settings).await.unwrap();
        let ids: Vec<_> = summary.outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["G3", "G1", "G2"]);
        assert_eq!(summary.succeeded().len(), 3);

        let folders = fixture.drive.folders();
        assert_eq!(folders.iter().filter(|f| f.name == "glaciers").count(), 1);
        assert_eq!(folders.len(), 4);
        assert_eq!(fixture.log().read_all().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_coarse_only_run_still_logs() {
        let fixture = Fixture::new();
        let mut settings = settings();
        settings.flags.coarse_dem_only = true;

        let summary = fixture.run(&["G1"], settings).await.unwrap();
        assert_eq!(summary.outcomes[0].state, GlacierState::Logged);
        assert!(fixture.scenes.searches().is_empty());
        assert_eq!(fixture.exports.submitted()[0].source, "USGS/GMTED2010");

        let rows = fixture.log().read_all().unwrap();
        assert_eq!(rows[0].l8_dates, "[]");
    }

    #[test]
    fn test_settings_from_config() {
        let config = RunConfig::from_template(&crate::config::template()).unwrap();
        let settings = RunSettings::from_config(&config).unwrap();
        assert_eq!(settings.folder_name, "glaciers");
        assert_eq!(settings.retry.delay(1), Duration::from_secs(2));
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.max_concurrent, 1);
    }
}
