//! CLI command implementations

use crate::dry_run::{DryRunProvider, DryRunSink, ScriptedEvent, SharedRecorder};
use crate::output::{print_entries, print_fields, print_json, OutputFormat};
use anyhow::Context;
use castway_core::{
    drm::ProtectionData,
    engine::select_engine,
    filter_entries,
    playlist::{loader::FETCH_FAILURE_NOTICE, parse_detailed, ParsedPlaylist},
    samples, ChannelEntry, ChannelEntryPatch, JsonFileStore, LoaderConfig, PlaybackOrchestrator, PlaylistLoader,
    RequestPipeline, Settings, StreamConfig,
};
use serde_json::json;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

pub type AppSettings = Settings<JsonFileStore>;

/// Stream request options shared by `plan` and `simulate`
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StreamArgs {
    /// Stream URL
    pub url: String,

    /// Cookie header value
    #[arg(long)]
    pub cookie: Option<String>,

    /// Referer header value
    #[arg(long)]
    pub referer: Option<String>,

    /// Origin header value
    #[arg(long)]
    pub origin: Option<String>,

    /// User agent ("Default" keeps the transport's own)
    #[arg(long)]
    pub user_agent: Option<String>,

    /// DRM scheme (widevine, playready, clearkey)
    #[arg(long)]
    pub drm_scheme: Option<String>,

    /// DRM license server URL
    #[arg(long)]
    pub license_url: Option<String>,
}

impl StreamArgs {
    fn to_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.url.clone(),
            cookie: self.cookie.clone(),
            referer: self.referer.clone(),
            origin: self.origin.clone(),
            user_agent: self.user_agent.clone(),
            drm_scheme: self.drm_scheme.clone(),
            drm_license_url: self.license_url.clone(),
            title: None,
        }
    }
}

fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Load a playlist from a URL or a local file and list its entries
pub async fn load(
    settings: &AppSettings,
    source: &str,
    search: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let parsed: ParsedPlaylist = if is_remote(source) {
        let loader = PlaylistLoader::new(&LoaderConfig::default())?;
        match loader.load_detailed(source, settings.proxy()).await {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("{}", FETCH_FAILURE_NOTICE);
                return Err(e.into());
            }
        }
    } else {
        let text = std::fs::read_to_string(source).with_context(|| format!("reading {}", source))?;
        parse_detailed(&text, source)
    };

    let matches = filter_entries(&parsed.entries, search.unwrap_or_default());
    let shown: Vec<&ChannelEntry> = matches.iter().copied().take(limit).collect();

    if format != OutputFormat::Json {
        println!(
            "{} entries ({}), {} skipped, {} matching, showing {}",
            parsed.entries.len(),
            parsed.format,
            parsed.skipped.len(),
            matches.len(),
            shown.len()
        );
        for skip in &parsed.skipped {
            debug!(position = skip.position, reason = %skip.reason, "Skipped record");
        }
    }

    print_entries(&shown, format)
}

/// Show the protocol and engine chosen for a URL
pub fn classify(url: &str, format: OutputFormat) -> anyhow::Result<()> {
    let protocol = castway_core::classify(url);
    let engine = select_engine(protocol, true);

    match format {
        OutputFormat::Json => print_json(&json!({ "url": url, "protocol": protocol, "engine": engine })),
        _ => {
            print_fields(
                &[("Protocol", protocol.to_string()), ("Engine", engine.to_string())],
                format,
            );
            Ok(())
        }
    }
}

/// Rewrite a URL through the configured proxy template
pub fn rewrite(settings: &AppSettings, url: &str, format: OutputFormat) -> anyhow::Result<()> {
    let rewritten = settings.proxy().rewrite_with(url, true);
    match format {
        OutputFormat::Json => print_json(&json!({ "url": url, "rewritten": rewritten })),
        _ => {
            println!("{}", rewritten);
            Ok(())
        }
    }
}

/// Describe how a stream would be requested
pub fn plan(settings: &AppSettings, args: &StreamArgs, proxied: bool, format: OutputFormat) -> anyhow::Result<()> {
    let config = args.to_config();
    let protocol = castway_core::classify(&config.url);
    let engine = select_engine(protocol, true);
    let use_proxy = proxied || settings.proxy().enabled;
    let protection = ProtectionData::from_config(&config);

    let pipeline = RequestPipeline::new(Arc::new(config.clone()), settings.proxy().template.clone(), use_proxy);
    let request = pipeline.prepare(&config.url);
    let headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or("<binary>").to_string()))
        .collect();

    if format == OutputFormat::Json {
        return print_json(&json!({
            "protocol": protocol,
            "engine": engine,
            "proxied": use_proxy,
            "requestUrl": request.url,
            "withCredentials": request.with_credentials,
            "headers": headers
                .iter()
                .map(|(name, value)| (name.clone(), json!(value)))
                .collect::<serde_json::Map<_, _>>(),
            "protection": protection,
        }));
    }

    let mut fields = vec![
        ("Protocol", protocol.to_string()),
        ("Engine", engine.to_string()),
        ("Proxied", use_proxy.to_string()),
        ("Request URL", request.url.clone()),
        ("Credentials", request.with_credentials.to_string()),
    ];
    for (name, value) in &headers {
        fields.push(("Header", format!("{}: {}", name, value)));
    }
    if let Some(data) = &protection {
        fields.push(("Key system", data.key_system.clone()));
        fields.push(("License URL", data.server_url.clone()));
    }
    print_fields(&fields, format);
    Ok(())
}

/// Run the orchestrator against scripted engines and report each decision
pub fn simulate(
    settings: &AppSettings,
    args: &StreamArgs,
    events: &[ScriptedEvent],
    no_hls: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let recorder = SharedRecorder::default();
    let provider = DryRunProvider {
        recorder: Rc::clone(&recorder),
        hls_supported: !no_hls,
    };
    let mut orchestrator =
        PlaybackOrchestrator::new(provider, DryRunSink(Rc::clone(&recorder)), settings.proxy().clone());

    orchestrator.play(args.to_config());
    let mut steps = vec![json!({ "event": "play", "state": orchestrator.state() })];

    for event in events {
        if !event.emit(&recorder) {
            break;
        }
        orchestrator.drain_events();
        steps.push(json!({ "event": format!("{:?}", event), "state": orchestrator.state() }));
    }

    let calls = std::mem::take(&mut recorder.borrow_mut().calls);
    let proxying = orchestrator.is_proxying();
    let auto_proxy = orchestrator.auto_proxy_active();
    let hints = orchestrator.troubleshooting_hints();

    if format == OutputFormat::Json {
        return print_json(&json!({
            "steps": steps,
            "calls": calls,
            "proxying": proxying,
            "autoProxy": auto_proxy,
            "hints": hints,
        }));
    }

    for call in &calls {
        println!("  {}", call);
    }
    for step in &steps {
        println!("{} -> {}", step["event"], step["state"]);
    }
    println!("proxying: {} (auto fallback: {})", proxying, auto_proxy);
    if let Some(message) = orchestrator.state().error_message() {
        println!("error: {}", message);
        for hint in hints {
            println!("  - {}", hint);
        }
    }
    Ok(())
}

/// Proxy settings
pub fn proxy_show(settings: &AppSettings, format: OutputFormat) -> anyhow::Result<()> {
    let proxy = settings.proxy();
    match format {
        OutputFormat::Json => print_json(proxy),
        _ => {
            print_fields(
                &[("Enabled", proxy.enabled.to_string()), ("Template", proxy.template.clone())],
                format,
            );
            Ok(())
        }
    }
}

pub fn proxy_enable(settings: &mut AppSettings, enabled: bool) -> anyhow::Result<()> {
    settings.set_proxy_enabled(enabled)?;
    println!("CORS proxy {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub fn proxy_template(settings: &mut AppSettings, template: Option<&str>) -> anyhow::Result<()> {
    match template {
        Some(template) => settings.set_proxy_template(template)?,
        None => settings.reset_proxy_template()?,
    }
    println!("Proxy template: {}", settings.proxy().template);
    Ok(())
}

/// Custom playlist library
pub fn list_show(settings: &AppSettings, search: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let entries = filter_entries(settings.custom_playlists(), search.unwrap_or_default());
    print_entries(&entries, format)
}

pub fn list_add(
    settings: &mut AppSettings,
    name: &str,
    url: &str,
    user_agent: Option<String>,
    cookie: Option<String>,
    referer: Option<String>,
) -> anyhow::Result<()> {
    let mut entry = ChannelEntry::new(uuid::Uuid::new_v4().simple().to_string(), name, url);
    if let Some(user_agent) = user_agent {
        entry.user_agent = user_agent;
    }
    entry.cookie = cookie;
    entry.referer = referer;

    let id = entry.id.clone();
    settings.add_playlist(entry)?;
    println!("Added {} ({})", name, id);
    Ok(())
}

pub fn list_update(settings: &mut AppSettings, id: &str, patch: &ChannelEntryPatch) -> anyhow::Result<()> {
    if !settings.update_playlist(id, patch)? {
        anyhow::bail!("no custom entry with id {}", id);
    }
    println!("Updated {}", id);
    Ok(())
}

pub fn list_remove(settings: &mut AppSettings, id: &str) -> anyhow::Result<()> {
    if !settings.delete_playlist(id)? {
        anyhow::bail!("no custom entry with id {}", id);
    }
    println!("Removed {}", id);
    Ok(())
}

/// Built-in samples
pub fn show_samples(format: OutputFormat) -> anyhow::Result<()> {
    let catalog = samples::catalog();
    if format == OutputFormat::Json {
        return print_json(catalog);
    }

    for category in catalog {
        println!("{}", category.title);
        for item in category.items {
            let drm = item.drm_scheme.map(|s| format!(" [{}]", s)).unwrap_or_default();
            println!("  {}{}", item.title, drm);
            println!("    {}", item.url);
        }
    }
    Ok(())
}
