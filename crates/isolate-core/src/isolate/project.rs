//! Isolation coordinator.
//!
//! Owns everything shared by the recursive isolation of a batch: the package
//! list, the at-most-once cache, the tainted list, backups, temp resources and
//! the product list. Packages are isolated one at a time; `&mut self` on every
//! entry point makes that a compile-time property.

use super::backup::BackupStore;
use super::config::BundleOptions;
use super::filter::PackageFilter;
use super::integrate::{self, Integration};
use super::package::IsolatedPackage;
use super::temp::TempRegistry;
use super::{Stage, Step};
use crate::error::{IoContext, IsolateError, Result};
use crate::jobs::{Job, JobHandler, JobRunner};
use crate::tools::{self, Toolchain};
use crate::workspace::{discover_packages, find_workspace_root};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DIST_DIR: &str = "dist";

/// Progress notifications for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    PackageStarted { name: String },
    PackageIsolated { name: String },
    ProductAdded { path: PathBuf },
}

type Subscriber = Box<dyn Fn(&ProjectEvent) + Send + Sync>;

pub struct Project {
    root: PathBuf,
    dist: PathBuf,
    runner: Arc<JobRunner>,
    toolchain: Arc<dyn Toolchain>,
    packages: Vec<IsolatedPackage>,
    loaded: bool,
    /// name -> index of every package isolated so far
    isolated: HashMap<String, usize>,
    /// Packages currently mid-isolation, outermost first.
    in_progress: Vec<String>,
    tainted: Vec<usize>,
    temps: TempRegistry,
    backups: BackupStore,
    products: Vec<PathBuf>,
    options: BundleOptions,
    subscribers: Vec<Subscriber>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("root", &self.root)
            .field("packages", &self.packages.len())
            .field("isolated", &self.isolated.len())
            .field("products", &self.products)
            .finish_non_exhaustive()
    }
}

impl Project {
    pub fn new(
        root: impl Into<PathBuf>,
        runner: Arc<JobRunner>,
        toolchain: Arc<dyn Toolchain>,
    ) -> Self {
        let root = root.into();
        Self {
            dist: root.join(DIST_DIR),
            root,
            runner,
            toolchain,
            packages: Vec::new(),
            loaded: false,
            isolated: HashMap::new(),
            in_progress: Vec::new(),
            tainted: Vec::new(),
            temps: TempRegistry::new(),
            backups: BackupStore::new(),
            products: Vec::new(),
            options: BundleOptions::default(),
            subscribers: Vec::new(),
        }
    }

    /// Open the workspace enclosing `start`.
    pub fn discover(
        start: &Path,
        runner: Arc<JobRunner>,
        toolchain: Arc<dyn Toolchain>,
    ) -> Result<Self> {
        let root = find_workspace_root(start).ok_or_else(|| IsolateError::WorkspaceNotFound {
            start: start.to_path_buf(),
        })?;
        Ok(Self::new(root, runner, toolchain))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn dist_path(&self) -> &Path {
        &self.dist
    }

    /// Artifacts created so far, in creation order.
    #[must_use]
    pub fn products(&self) -> &[PathBuf] {
        &self.products
    }

    #[must_use]
    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// Workspace packages, discovered on first use.
    pub fn packages(&mut self) -> Result<&[IsolatedPackage]> {
        if !self.loaded {
            self.packages = discover_packages(&self.root)?
                .into_iter()
                .map(IsolatedPackage::new)
                .collect::<Result<_>>()?;
            self.loaded = true;
            debug!(count = self.packages.len(), root = %self.root.display(), "packages loaded");
        }
        Ok(&self.packages)
    }

    pub fn package_names(&mut self) -> Result<Vec<String>> {
        Ok(self.packages()?.iter().map(|p| p.name().to_string()).collect())
    }

    pub fn filter_packages(&mut self, filter: &PackageFilter) -> Result<Vec<&IsolatedPackage>> {
        Ok(filter.apply(self.packages()?))
    }

    /// Look up a package by name.
    pub fn package(&mut self, name: &str) -> Result<&IsolatedPackage> {
        let index = self.index_of(name)?;
        Ok(&self.packages[index])
    }

    fn index_of(&mut self, name: &str) -> Result<usize> {
        self.packages()?
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| IsolateError::PackageUnknown {
                name: name.to_string(),
            })
    }

    /// Subscribe to project events.
    pub fn on(&mut self, subscriber: impl Fn(&ProjectEvent) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn announce(&self, event: &ProjectEvent) {
        debug!(?event, "event");
        for subscriber in &self.subscribers {
            subscriber(event);
        }
    }

    /// Register a finished artifact. Returns `false` for a path already known.
    pub fn add_product(&mut self, path: PathBuf) -> bool {
        if self.products.contains(&path) {
            return false;
        }
        self.products.push(path.clone());
        self.announce(&ProjectEvent::ProductAdded { path });
        true
    }

    /// Register a path to delete when the batch ends.
    pub fn add_temp(&mut self, path: impl Into<PathBuf>) {
        self.temps.add(path);
    }

    /// Isolate `names` (every package when empty), then clean up.
    ///
    /// Cleanup runs whether or not the batch succeeded. On success the
    /// product list is returned.
    pub async fn isolate_packages(
        &mut self,
        names: &[String],
        options: BundleOptions,
    ) -> Result<Vec<PathBuf>> {
        let outcome = self.run_batch(names, options).await;
        let cleaned = self.cleanup().await;
        outcome?;
        cleaned?;
        Ok(self.products.clone())
    }

    async fn run_batch(&mut self, names: &[String], options: BundleOptions) -> Result<()> {
        self.options = options;

        let targets: Vec<usize> = if names.is_empty() {
            (0..self.packages()?.len()).collect()
        } else {
            names
                .iter()
                .map(|name| self.index_of(name))
                .collect::<Result<_>>()?
        };

        info!(count = targets.len(), "isolating packages");
        let jobs = targets
            .into_iter()
            .map(|index| {
                let label = format!("Isolate {}", self.packages[index].name());
                Job::new(label, Step::new(index, Stage::Isolate)).big()
            })
            .collect();

        let runner = Arc::clone(&self.runner);
        runner.run_jobs(self, jobs).await
    }

    /// Isolate one package (and whatever it bundles) without cleaning up.
    ///
    /// A package already isolated by this project is returned from the cache.
    pub async fn isolate_package(
        &mut self,
        name: &str,
        options: BundleOptions,
    ) -> Result<&IsolatedPackage> {
        let index = self.index_of(name)?;
        self.options = options;
        self.isolate_index(index).await?;
        Ok(&self.packages[index])
    }

    fn isolate_index(&mut self, index: usize) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let name = self.packages[index].name().to_string();

            if self.isolated.contains_key(&name) {
                debug!(package = %name, "already isolated");
                return Ok(());
            }
            if let Some(position) = self.in_progress.iter().position(|n| *n == name) {
                let mut chain = self.in_progress[position..].to_vec();
                chain.push(name);
                return Err(IsolateError::DependencyCycle { chain });
            }

            self.in_progress.push(name.clone());
            let outcome = self.isolate_uncached(index).await;
            self.in_progress.pop();
            outcome?;

            self.isolated.insert(name, index);
            Ok(())
        })
    }

    async fn isolate_uncached(&mut self, index: usize) -> Result<()> {
        if !self.tainted.contains(&index) {
            self.tainted.push(index);
        }
        isolate_util::fs::ensure_dir(&self.dist).await.at(&self.dist)?;

        let options = self.options;
        self.packages[index].initialize(&options).await?;

        let package = &self.packages[index];
        let name = package.name().to_string();
        let mut jobs: Vec<Job<Step>> = package
            .stages()
            .into_iter()
            .map(|(label, stage)| Job::new(format!("{label} {name}"), Step::new(index, stage)))
            .collect();
        if let Some(last) = jobs.pop() {
            jobs.push(last.then(Step::new(index, Stage::Announce)));
        }

        self.announce(&ProjectEvent::PackageStarted { name });
        let runner = Arc::clone(&self.runner);
        runner.run_jobs(self, jobs).await
    }

    async fn build(&mut self, index: usize) -> Result<()> {
        let location = self.packages[index].location().to_path_buf();
        self.toolchain.run_script(&location, "build").await
    }

    async fn isolate_dependencies(&mut self, index: usize) -> Result<()> {
        let linked = integrate::linked_dependencies(&self.packages[index], &self.packages);
        let cwd = self.packages[index].location().to_path_buf();

        let mut bundled = Vec::new();
        for dep in linked {
            let decision =
                integrate::integrate_dependency(self.toolchain.as_ref(), &self.packages[dep], &cwd)
                    .await?;
            if decision == Integration::Bundle {
                self.isolate_index(dep).await?;
                bundled.push(dep);
            }
        }

        self.store_dependencies(&cwd, &bundled).await?;

        let references: Vec<(String, String)> = bundled
            .iter()
            .map(|&dep| {
                let dep = &self.packages[dep];
                (dep.name().to_string(), dep.bundled_reference())
            })
            .collect();

        let package = &mut self.packages[index];
        package.bundled = references.iter().map(|(name, _)| name.clone()).collect();
        package.reference_bundled(&mut self.backups, &references).await
    }

    /// Copy bundled archives, and the archives they bundle in turn, into `dir`.
    async fn store_dependencies(&mut self, dir: &Path, bundled: &[usize]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut pending: Vec<usize> = bundled.iter().rev().copied().collect();

        while let Some(dep) = pending.pop() {
            if !seen.insert(dep) {
                continue;
            }

            let package = &self.packages[dep];
            let tarball = package
                .tarball
                .as_ref()
                .ok_or_else(|| IsolateError::NothingToBundle {
                    name: package.name().to_string(),
                })?;
            let dest = dir.join(package.bundled_archive_name());
            isolate_util::fs::copy_file(tarball, &dest).await.at(&dest)?;
            debug!(dependency = %package.name(), dest = %dest.display(), "bundled");

            for nested in package.bundled.iter().rev() {
                if let Some(nested) = self.packages.iter().position(|p| p.name() == nested) {
                    pending.push(nested);
                }
            }
        }

        Ok(())
    }

    async fn pack(&mut self, index: usize) -> Result<()> {
        let dest = self.temps.create_dir()?;
        let location = self.packages[index].location().to_path_buf();
        let tarball = self.toolchain.pack(&location, &dest).await?;
        self.packages[index].tarball = Some(tarball);
        Ok(())
    }

    async fn extract(&mut self, index: usize) -> Result<()> {
        let tarball = self.intermediate(index, |p| p.tarball.as_ref(), "tarball")?;
        let dest = self.temps.create_dir()?;
        tools::extract_tarball(&tarball, &dest).await?;
        self.packages[index].extracted = Some(dest);
        Ok(())
    }

    async fn zip(&mut self, index: usize) -> Result<()> {
        let extracted = self.intermediate(index, |p| p.extracted.as_ref(), "extracted tree")?;
        let dest = self
            .temps
            .create_file(&format!("-{}", self.packages[index].zip_name()))?;
        tools::zip_directory(&extracted, &dest).await?;
        self.packages[index].zip = Some(dest);
        Ok(())
    }

    async fn store(&mut self, index: usize, stage: Stage) -> Result<()> {
        let package = &self.packages[index];
        let (source, file_name) = match stage {
            Stage::StoreRaw => (
                self.intermediate(index, |p| p.extracted.as_ref(), "extracted tree")?,
                package.raw_name(),
            ),
            Stage::StoreZip => (
                self.intermediate(index, |p| p.zip.as_ref(), "zip")?,
                package.zip_name(),
            ),
            _ => (
                self.intermediate(index, |p| p.tarball.as_ref(), "tarball")?,
                package.archive_name(),
            ),
        };

        for dest in package.store_paths(&self.dist, &file_name) {
            if stage == Stage::StoreRaw {
                isolate_util::fs::remove_path(&dest).await.at(&dest)?;
                isolate_util::fs::copy_dir_all(&source, &dest).await.at(&dest)?;
            } else {
                isolate_util::fs::copy_file(&source, &dest).await.at(&dest)?;
            }
            debug!(dest = %dest.display(), "stored");
            self.add_product(dest);
        }
        Ok(())
    }

    fn intermediate(
        &self,
        index: usize,
        get: impl Fn(&IsolatedPackage) -> Option<&PathBuf>,
        what: &str,
    ) -> Result<PathBuf> {
        let package = &self.packages[index];
        get(package).cloned().ok_or_else(|| {
            IsolateError::archive(format!("{}: no {what} produced yet", package.name()))
        })
    }

    /// Restore every tainted package and delete temp resources.
    ///
    /// Safe to call more than once; also used after an interrupted batch.
    pub async fn cleanup(&mut self) -> Result<()> {
        let mut first_error = None;

        for index in std::mem::take(&mut self.tainted) {
            let package = &mut self.packages[index];
            if let Err(e) = package.cleanup(&mut self.backups).await {
                warn!(package = %package.name(), error = %e, "cleanup failed");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.backups.restore_all().await {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.temps.purge().await {
            first_error.get_or_insert(e);
        }
        self.in_progress.clear();

        first_error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl JobHandler<Step> for Project {
    async fn run(&mut self, step: &Step) -> Result<()> {
        let index = step.index;
        match step.stage {
            Stage::Isolate => self.isolate_index(index).await,
            Stage::Announce => {
                let name = self.packages[index].name().to_string();
                self.announce(&ProjectEvent::PackageIsolated { name });
                Ok(())
            }
            Stage::Ignore => {
                debug!(package = %self.packages[index].name(), "ignored");
                Ok(())
            }
            Stage::Build => self.build(index).await,
            Stage::Configure => self.packages[index].configure(&mut self.backups).await,
            Stage::Backup => self.packages[index].backup(&mut self.backups).await,
            Stage::IsolateDeps => self.isolate_dependencies(index).await,
            Stage::Package => self.pack(index).await,
            Stage::Extract => self.extract(index).await,
            Stage::Zip => self.zip(index).await,
            Stage::Store | Stage::StoreRaw | Stage::StoreZip => self.store(index, step.stage).await,
        }
    }
}
