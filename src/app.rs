//! Wires the workspace crates together from a [`Config`] and runs one command.

use crate::cli::{
    CacheCommand, Commands, DiscoverArgs, FetchArgs, NetworkArgs, PrefetchArgs, PreferredCommand, WarmArgs,
};
use crate::error::{ErrorKind, Result};
use dexsprite_cache::{Database, PreferredRepository, Repository, TieredCache, TieredCacheOptions};
use dexsprite_config::{Config, PrefetchConfig};
use dexsprite_discovery::network::{MeasuredSignal, SignalHandle, StaticSignal};
use dexsprite_discovery::{
    DiscoveryOptions, EffectiveType, NetworkAdvisor, NetworkProfile, Pipeline, PrefetchQueue, VariantDiscoverer,
    Warmer,
};
use dexsprite_proxy::{CACHE_HEADER, ClientMessage, InterceptionProxy, ProxyOptions, VariantsApi, VariantsResponse};
use dexsprite_remote::header::{self, HeaderMap, HeaderValue};
use dexsprite_remote::{HttpRemote, HttpRemoteOptions, Probe, RemoteHandle, RemoteRequest, Url};
use dexsprite_storage::ResourceCache;
use dexsprite_storage::backend::LocalBackend;
use dexsprite_variant::{Subject, UrlBuilder, VariantList};
use exn::ResultExt;
use std::fmt::Display;
use std::io::{Read, Write};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info, warn};

fn emit(line: impl Display) -> Result<()> {
    writeln!(std::io::stdout(), "{line}").or_raise(|| ErrorKind::Output)
}

fn parse_subject(id: &str) -> Result<Subject> {
    id.parse::<Subject>().or_raise(|| ErrorKind::InvalidArgument(format!("subject id {id:?}")))
}

/// Signal the prefetch queue paces itself by.
///
/// An effective type from the command line or the config pins a static
/// profile. Without one, quality is measured from warming downloads, which is
/// why the measuring signal is shared with the [`Warmer`].
pub fn network_signal(
    prefetch: &PrefetchConfig,
    args: &NetworkArgs,
    meter: Arc<MeasuredSignal>,
) -> Result<SignalHandle> {
    let configured = prefetch.network.as_ref();
    let effective_type = match (&args.effective_type, configured) {
        (Some(value), _) => Some(value),
        (None, Some(network)) => Some(&network.effective_type),
        (None, None) => None,
    };
    let Some(effective_type) = effective_type else {
        meter.set_save_data(args.save_data);
        return Ok(meter);
    };
    let effective_type = effective_type
        .parse::<EffectiveType>()
        .or_raise(|| ErrorKind::InvalidArgument(format!("effective type {effective_type:?}")))?;
    let mut profile = NetworkProfile::new(effective_type);
    if let Some(network) = configured {
        profile = profile.with_downlink(network.downlink_mbps).with_save_data(network.save_data);
    }
    if args.save_data {
        profile = profile.with_save_data(true);
    }
    debug!(effective_type = %profile.effective_type, save_data = profile.save_data, "Using a fixed network profile");
    Ok(Arc::new(StaticSignal(profile)))
}

/// Run one command to completion.
pub async fn run_app(cli: crate::cli::Cli) -> Result<()> {
    let command = match cli.command {
        Commands::Suffix { index } => return emit(dexsprite_variant::suffix(index)),
        Commands::Index { suffix } => {
            let index = dexsprite_variant::index(&suffix)
                .or_raise(|| ErrorKind::InvalidArgument(format!("suffix {suffix:?}")))?;
            return emit(index);
        },
        command => command,
    };
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let app = App::open(config, &cli.network).await?;
    let result = app.run(command).await;
    app.close().await;
    result
}

pub struct App {
    config: Config,
    db: Database,
    preferred: PreferredRepository,
    remote: RemoteHandle,
    urls: UrlBuilder,
    discoverer: VariantDiscoverer,
    images: ResourceCache,
    pages: ResourceCache,
    meter: Arc<MeasuredSignal>,
    advisor: NetworkAdvisor,
}

impl App {
    pub async fn open(config: Config, network: &NetworkArgs) -> Result<Self> {
        let database_path = config.database_path().or_raise(|| ErrorKind::Config)?;
        debug!(path = %database_path.display(), "Opening cache database");
        let db = Database::connect(&database_path).await.or_raise(|| ErrorKind::Cache)?;
        let cache = TieredCache::new(
            Repository::from(&db),
            TieredCacheOptions { ttl: config.cache.ttl(), flush_window: config.cache.flush_window() },
        );

        let mut options = HttpRemoteOptions {
            timeout: config.remote.request_timeout(),
            connect_timeout: config.remote.connect_timeout(),
            ..HttpRemoteOptions::default()
        };
        if let Some(user_agent) = &config.remote.user_agent {
            options.user_agent = user_agent.clone();
        }
        let remote: RemoteHandle = Arc::new(HttpRemote::new("asset-host", &options).or_raise(|| ErrorKind::Remote)?);

        let urls = UrlBuilder::new(&config.remote.base_url, config.remote.extension.clone())
            .or_raise(|| ErrorKind::Config)?;
        let probe = Probe::new(remote.clone()).with_timeout(config.remote.probe_timeout());
        let discoverer = VariantDiscoverer::new(
            cache,
            probe,
            urls.clone(),
            DiscoveryOptions {
                max_depth: config.discovery.max_depth,
                retry_transient: config.discovery.retry_transient,
            },
        );

        let resources_dir = config.images_dir().or_raise(|| ErrorKind::Config)?;
        let resources_dir = std::path::absolute(&resources_dir).or_raise(|| ErrorKind::Cache)?;
        let backend = Arc::new(LocalBackend::new("resources", &resources_dir).or_raise(|| ErrorKind::Cache)?);
        let images = ResourceCache::new(backend.clone(), "images").or_raise(|| ErrorKind::Cache)?;
        let pages = ResourceCache::new(backend, "pages").or_raise(|| ErrorKind::Cache)?;

        let meter = Arc::new(MeasuredSignal::default());
        let advisor = NetworkAdvisor::new(network_signal(&config.prefetch, network, meter.clone())?);

        Ok(Self {
            preferred: PreferredRepository::from(&db),
            config,
            db,
            remote,
            urls,
            discoverer,
            images,
            pages,
            meter,
            advisor,
        })
    }

    /// Flush pending cache writes and close the database.
    pub async fn close(&self) {
        self.discoverer.cache().shutdown().await;
        self.db.close().await;
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Discover(args) => self.discover(args).await,
            Commands::Prefetch(args) => self.prefetch(args).await,
            Commands::Warm(args) => self.warm(args).await,
            Commands::Fetch(args) => self.fetch(args).await,
            Commands::Preferred(command) => self.preferred(command).await,
            Commands::Cache(command) => self.cache(command).await,
            Commands::Suffix { .. } | Commands::Index { .. } => Ok(()),
        }
    }

    fn pipeline(&self, warm: bool) -> Pipeline {
        let pipeline = Pipeline::new(self.discoverer.clone());
        if !warm {
            return pipeline;
        }
        let warmer = Warmer::new(self.remote.clone(), self.images.clone(), self.urls.clone())
            .with_timeout(self.config.remote.request_timeout())
            .with_meter(self.meter.clone());
        pipeline.with_warmer(warmer)
    }

    fn queue(&self, warm: bool) -> PrefetchQueue {
        PrefetchQueue::new(Arc::new(self.pipeline(warm)), self.advisor.clone())
    }

    fn proxy(&self, queue: Option<PrefetchQueue>) -> InterceptionProxy {
        let options = ProxyOptions {
            api_path: self.config.proxy.api_path.clone(),
            shell_path: self.config.proxy.shell_path.clone(),
        };
        let proxy = InterceptionProxy::new(self.remote.clone(), self.images.clone(), self.pages.clone(), options)
            .with_api(VariantsApi::new(self.discoverer.clone()));
        match queue {
            Some(queue) => proxy.with_queue(queue),
            None => proxy,
        }
    }

    /// Let `queue` finish what it has (or stop on Ctrl+C), then shut it down.
    async fn drain(&self, queue: &PrefetchQueue) {
        let wake = self.config.prefetch.wake_interval().map(|period| queue.spawn_periodic_wake(period));
        tokio::select! {
            () = queue.wait_idle() => {},
            _ = tokio::signal::ctrl_c() => warn!("Interrupted, stopping prefetch"),
        }
        if let Some(wake) = wake {
            wake.abort();
        }
        queue.shutdown().await;
        let stats = queue.stats();
        info!(
            batches = stats.batches,
            processed = stats.processed,
            failed = stats.failed,
            halts = stats.halts,
            left = queue.len(),
            "Prefetch finished"
        );
    }

    async fn discover(&self, args: DiscoverArgs) -> Result<()> {
        let subject = parse_subject(&args.id)?;
        let response = if args.preview {
            let depth = args.depth.unwrap_or(self.config.discovery.preview_depth);
            let variants = self.discoverer.preview(&subject, depth).await.or_raise(|| ErrorKind::Discovery)?;
            VariantsResponse::new(subject.key(), variants, UtcDateTime::now())
        } else {
            let depth = args.depth.unwrap_or(self.discoverer.max_depth());
            let entry = self.discoverer.discover_entry(&subject, depth).await.or_raise(|| ErrorKind::Discovery)?;
            VariantsResponse::new(entry.key, entry.variants, entry.discovered_at)
        };
        if args.json {
            let json = serde_json::to_string(&response).or_raise(|| ErrorKind::Output)?;
            return emit(json);
        }
        if response.variants.is_empty() {
            info!(key = %subject, "No artwork");
            return Ok(());
        }
        let preferred = self.preferred.get(&subject.key()).await.or_raise(|| ErrorKind::Cache)?;
        let names = file_names(&self.urls, &subject, &response.variants);
        for (suffix, name) in response.variants.iter().zip(names) {
            let marker = match &preferred {
                Some(preferred) if preferred.suffix == *suffix => " *",
                _ => "",
            };
            emit(format_args!("{name}{marker}"))?;
        }
        Ok(())
    }

    async fn prefetch(&self, args: PrefetchArgs) -> Result<()> {
        let subjects = args.ids.iter().map(|id| parse_subject(id)).collect::<Result<Vec<_>>>()?;
        if !self.config.prefetch.enabled {
            warn!("Prefetching is disabled in the config; running this request anyway");
        }
        let queue = self.queue(!args.no_warm && self.config.prefetch.warm_images);
        let accepted = queue.enqueue(subjects).await;
        info!(accepted, "Queued subjects");
        self.drain(&queue).await;
        for id in &args.ids {
            let subject = parse_subject(id)?;
            match self.discoverer.cache().get(&subject.key()).await {
                Some(entry) => emit(format_args!("{}\t{}", entry.key, entry.variants.len()))?,
                None => emit(format_args!("{}\t-", subject.key()))?,
            }
        }
        Ok(())
    }

    async fn warm(&self, args: WarmArgs) -> Result<()> {
        let json = match args.message {
            Some(json) => json,
            None => {
                let mut json = String::new();
                std::io::stdin()
                    .read_to_string(&mut json)
                    .or_raise(|| ErrorKind::InvalidArgument("unreadable stdin".to_string()))?;
                json
            },
        };
        let message = ClientMessage::from_json(&json)
            .or_raise(|| ErrorKind::InvalidArgument("client message".to_string()))?;
        let queue = self.queue(true);
        let proxy = self.proxy(Some(queue.clone()));
        let queued = proxy
            .handle_message(&message)
            .or_raise(|| ErrorKind::InvalidArgument("client message".to_string()))?;
        if !queued {
            info!("Nothing new to warm");
        }
        self.drain(&queue).await;
        Ok(())
    }

    async fn fetch(&self, args: FetchArgs) -> Result<()> {
        let url = Url::parse(&args.url).or_raise(|| ErrorKind::InvalidArgument(format!("url {:?}", args.url)))?;
        let mut headers = HeaderMap::new();
        if args.navigate {
            headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
            headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        }
        let request = RemoteRequest::get(url).with_headers(headers);

        let queue = self.config.prefetch.enabled.then(|| self.queue(self.config.prefetch.warm_images));
        let proxy = self.proxy(queue.clone());
        let class = proxy.classify(&request);
        let response = proxy.handle(request).await.or_raise(|| ErrorKind::Proxy)?;
        proxy.settle().await;

        let source = response.headers.get(CACHE_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("network");
        info!(%class, status = response.status.as_u16(), source, bytes = response.body.len(), "Fetched");
        if args.body {
            std::io::stdout().write_all(&response.body).or_raise(|| ErrorKind::Output)?;
        } else {
            emit(format_args!("{} {} ({source}, {} bytes)", response.status, class, response.body.len()))?;
        }
        if let Some(queue) = &queue {
            self.drain(queue).await;
        }
        Ok(())
    }

    async fn preferred(&self, command: PreferredCommand) -> Result<()> {
        match command {
            PreferredCommand::Get { id } => {
                let subject = parse_subject(&id)?;
                if let Some(preferred) = self.preferred.get(&subject.key()).await.or_raise(|| ErrorKind::Cache)? {
                    emit(self.urls.file_name(&subject, &preferred.suffix))?;
                }
            },
            PreferredCommand::Set { id, suffix } => {
                let subject = parse_subject(&id)?;
                dexsprite_variant::validate_suffix(&suffix)
                    .or_raise(|| ErrorKind::InvalidArgument(format!("suffix {suffix:?}")))?;
                self.preferred.set(&subject.key(), &suffix).await.or_raise(|| ErrorKind::Cache)?;
            },
            PreferredCommand::Clear { id: Some(id), .. } => {
                let subject = parse_subject(&id)?;
                if !self.preferred.clear(&subject.key()).await.or_raise(|| ErrorKind::Cache)? {
                    info!(key = %subject, "No preferred variant to clear");
                }
            },
            PreferredCommand::Clear { id: None, .. } => {
                let removed = self.preferred.clear_all().await.or_raise(|| ErrorKind::Cache)?;
                info!(removed, "Cleared preferred variants");
            },
            PreferredCommand::List => {
                for preferred in self.preferred.list().await.or_raise(|| ErrorKind::Cache)? {
                    emit(format_args!("{}\t{:?}", preferred.key, preferred.suffix))?;
                }
            },
        }
        Ok(())
    }

    async fn cache(&self, command: CacheCommand) -> Result<()> {
        match command {
            CacheCommand::Clear { resources } => {
                self.discoverer.cache().clear().await;
                info!("Cleared discovered variants");
                if resources {
                    let images = self.images.clear().await.or_raise(|| ErrorKind::Cache)?;
                    let pages = self.pages.clear().await.or_raise(|| ErrorKind::Cache)?;
                    info!(images, pages, "Cleared cached resources");
                }
            },
            CacheCommand::Prune => {
                let removed = self.discoverer.cache().prune().await.or_raise(|| ErrorKind::Cache)?;
                info!(removed, "Pruned expired variant lists");
            },
            CacheCommand::Stats => {
                let cache = self.discoverer.cache();
                let discovered = cache.repository().count().await.or_raise(|| ErrorKind::Cache)?;
                let preferred = self.preferred.list().await.or_raise(|| ErrorKind::Cache)?.len();
                let images = self.images.len().await.or_raise(|| ErrorKind::Cache)?;
                let pages = self.pages.len().await.or_raise(|| ErrorKind::Cache)?;
                emit(format_args!("discovered\t{discovered}"))?;
                emit(format_args!("preferred\t{preferred}"))?;
                emit(format_args!("images\t{images}"))?;
                emit(format_args!("pages\t{pages}"))?;
            },
        }
        Ok(())
    }
}

/// Variants as shown by `discover`, one file name per line.
pub fn file_names(urls: &UrlBuilder, subject: &Subject, variants: &VariantList) -> Vec<String> {
    variants.iter().map(|suffix| urls.file_name(subject, suffix)).collect()
}
