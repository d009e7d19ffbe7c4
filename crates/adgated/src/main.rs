//! adgated - The adgate service
//!
//! Wires the components together on one task:
//! - Configuration loading
//! - Ad gate (gating engine and slot controllers)
//! - Policy fetcher, impression tracker and presenter
//! - Tokio scheduler for retries
//! - Line protocol on stdin/stdout
//!
//! Requests are read as JSON lines from stdin. Responses and events are
//! written as JSON lines to stdout; logs go to stderr.

use adgate_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, LoadOutcome, Request, Response,
    ResponsePayload,
};
use adgate_config::{check_http_url, load_config, Settings};
use adgate_core::AdGate;
use adgate_net::{FetchingProvider, HeadlessPresenter, HttpImpressionTracker, HttpPolicyFetcher, Presenter};
use adgate_provider::{
    provider_channel, PolicyFetcher, ProviderEventReceiver, ProviderEventSender,
    ScheduledTaskReceiver, TokioScheduler,
};
use adgate_util::{default_config_path, AdResult, AppId, PartnerId, SystemClock};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// adgated - Interstitial ad gating service
#[derive(Parser, Debug)]
#[command(name = "adgated")]
#[command(about = "Interstitial ad gating and slot orchestration service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/adgate/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Partner ID override (or set ADGATE_PARTNER_ID env var)
    #[arg(long, env = "ADGATE_PARTNER_ID")]
    partner_id: Option<String>,

    /// App ID override (or set ADGATE_APP_ID env var)
    #[arg(long, env = "ADGATE_APP_ID")]
    app_id: Option<String>,

    /// How long the headless presenter keeps an ad "on screen", in seconds
    #[arg(long, default_value_t = 5)]
    dwell_secs: u64,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// One line of output
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outbound<'a> {
    Response(&'a Response),
    Event(&'a Event),
}

/// Main service state
struct Service {
    ad_gate: AdGate,
    presenter: Arc<dyn Presenter>,
    provider_tx: ProviderEventSender,
    provider_rx: ProviderEventReceiver,
    task_rx: ScheduledTaskReceiver,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let mut settings = if args.config.exists() {
            let settings = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(
                config_path = %args.config.display(),
                placements = settings.placements.len(),
                "Configuration loaded"
            );
            settings
        } else {
            warn!(
                config_path = %args.config.display(),
                "Config file not found, using defaults"
            );
            Settings::default()
        };

        if let Some(partner_id) = &args.partner_id {
            settings.service.partner_id = Some(PartnerId::new(partner_id.as_str()));
        }
        if let Some(app_id) = &args.app_id {
            settings.service.app_id = Some(AppId::new(app_id.as_str()));
        }

        let presenter = Arc::new(HeadlessPresenter::new(Duration::from_secs(args.dwell_secs)));
        Self::with_settings(settings, presenter)
    }

    /// Build the service on the current runtime
    fn with_settings(settings: Settings, presenter: Arc<dyn Presenter>) -> Result<Self> {
        let tracker = HttpImpressionTracker::new(&settings.network.track_url, settings.network.fetch_timeout)
            .context("Failed to create impression tracker")?;
        let (scheduler, task_rx) = TokioScheduler::new();
        let (provider_tx, provider_rx) = provider_channel();

        let ad_gate = AdGate::new(settings, Arc::new(SystemClock), Arc::new(scheduler))
            .with_tracker(Arc::new(tracker));

        let mut service = Self {
            ad_gate,
            presenter,
            provider_tx,
            provider_rx,
            task_rx,
        };

        if service.ad_gate.is_initialized() {
            service
                .attach_slots()
                .context("Failed to set up configured placements")?;
        }

        Ok(service)
    }

    /// (Re)create a slot for every configured placement using the current
    /// identity, and start loading the auto-load ones
    fn attach_slots(&mut self) -> AdResult<()> {
        let Some(identity) = self.ad_gate.identity().cloned() else {
            return Ok(());
        };
        let network = &self.ad_gate.settings().network;
        let base_url = identity.base_url.as_deref().unwrap_or(&network.base_url);
        let fetcher: Arc<dyn PolicyFetcher> =
            Arc::new(HttpPolicyFetcher::new(base_url, network.fetch_timeout)?);

        let placements = self.ad_gate.settings().placements.clone();
        for placement in placements {
            let provider = FetchingProvider::new(
                placement.id.clone(),
                identity.partner_id.clone(),
                identity.app_id.clone(),
                fetcher.clone(),
                self.presenter.clone(),
                self.provider_tx.clone(),
            );
            self.ad_gate.register_slot(placement.id.clone(), Arc::new(provider));

            if placement.auto_load {
                self.ad_gate.load(&placement.id);
            }
        }

        info!(
            placements = self.ad_gate.placements().len(),
            "Placements attached"
        );
        Ok(())
    }

    async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        self.flush_events();
        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let (response, shutdown) = self.handle_line(&line);
                            emit(&Outbound::Response(&response));
                            self.flush_events();
                            if shutdown {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Input closed, shutting down");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read input, shutting down");
                            break;
                        }
                    }
                }

                // Provider completions
                Some(event) = self.provider_rx.recv() => {
                    self.ad_gate.handle_provider_event(event);
                    self.flush_events();
                }

                // Fired retries
                Some(task) = self.task_rx.recv() => {
                    self.ad_gate.handle_scheduled(task);
                    self.flush_events();
                }
            }
        }

        info!("Shutting down adgated");
        self.ad_gate.shutdown();
        self.flush_events();
        emit(&Outbound::Event(&Event::new(EventPayload::Shutdown)));

        info!("Shutdown complete");
        Ok(())
    }

    /// Returns the response and whether the service should stop
    fn handle_line(&mut self, line: &str) -> (Response, bool) {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                debug!(request_id = request.request_id, command = ?request.command, "Request received");
                let shutdown = matches!(request.command, Command::Shutdown);
                (self.handle_command(request.request_id, request.command), shutdown)
            }
            Err(e) => {
                warn!(error = %e, "Invalid request");
                (
                    Response::error(
                        0,
                        ErrorInfo::new(ErrorCode::InvalidRequest, format!("Invalid request: {}", e)),
                    ),
                    false,
                )
            }
        }
    }

    fn handle_command(&mut self, request_id: u64, command: Command) -> Response {
        match command {
            Command::Initialize {
                partner_id,
                app_id,
                base_url,
            } => {
                if let Some(url) = &base_url
                    && let Err(e) = check_http_url(url)
                {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::InvalidRequest, format!("Invalid base_url: {}", e)),
                    );
                }
                if partner_id.trim().is_empty() || app_id.trim().is_empty() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::InvalidRequest, "partner_id and app_id are required"),
                    );
                }

                self.ad_gate
                    .initialize(PartnerId::new(partner_id), AppId::new(app_id), base_url);
                match self.attach_slots() {
                    Ok(()) => Response::success(request_id, ResponsePayload::Initialized),
                    Err(e) => Response::error(
                        request_id,
                        ErrorInfo::new(e.host_code().into(), e.to_string()),
                    ),
                }
            }

            Command::GetState => {
                Response::success(request_id, ResponsePayload::State(self.ad_gate.get_state()))
            }

            Command::CanShowAd => Response::success(
                request_id,
                ResponsePayload::CanShow {
                    allowed: self.ad_gate.can_show_ad(),
                },
            ),

            Command::DidShowAd => {
                self.ad_gate.did_show_ad();
                Response::success(request_id, ResponsePayload::ShowRecorded)
            }

            Command::UpdateServerRestrictions {
                cooldown_seconds,
                session_gate_seconds,
                ttl_seconds,
            } => {
                self.ad_gate
                    .update_server_restrictions(cooldown_seconds, session_gate_seconds, ttl_seconds);
                Response::success(request_id, ResponsePayload::RestrictionsUpdated)
            }

            Command::Load { placement } => match self.ad_gate.load(&placement) {
                LoadOutcome::NotInitialized => Response::error(
                    request_id,
                    ErrorInfo::new(
                        ErrorCode::NotInitialized,
                        format!("No active slot for placement '{}'", placement),
                    ),
                ),
                outcome => Response::success(request_id, ResponsePayload::Load(outcome)),
            },

            Command::Show { placement } => {
                let outcome = self.ad_gate.show(&placement);
                match outcome.host_error() {
                    Some(code) => Response::error(
                        request_id,
                        ErrorInfo::new(code.into(), format!("Cannot show '{}': {:?}", placement, outcome)),
                    ),
                    None => Response::success(request_id, ResponsePayload::Show(outcome)),
                }
            }

            Command::IsReady { placement } => Response::success(
                request_id,
                ResponsePayload::Ready {
                    ready: self.ad_gate.is_ready(&placement),
                },
            ),

            Command::Destroy { placement } => {
                if self.ad_gate.destroy_slot(&placement) {
                    Response::success(request_id, ResponsePayload::Destroyed)
                } else {
                    Response::error(
                        request_id,
                        ErrorInfo::new(
                            ErrorCode::NotInitialized,
                            format!("Unknown placement '{}'", placement),
                        ),
                    )
                }
            }

            Command::Shutdown => {
                info!("Shutdown requested");
                Response::success(request_id, ResponsePayload::ShuttingDown)
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }

    fn flush_events(&mut self) {
        for event in self.ad_gate.drain_events() {
            emit(&Outbound::Event(&Event::new(event.to_payload())));
        }
    }
}

fn emit(line: &Outbound<'_>) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(error = %e, "Failed to serialize output"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout carries the protocol
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "adgated starting");

    let service = Service::new(&args)?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use adgate_api::ResponseResult;
    use adgate_config::Placement;
    use adgate_util::PlacementId;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.placements = vec![Placement {
            id: PlacementId::new("main"),
            auto_load: false,
        }];
        settings
    }

    fn service() -> Service {
        let presenter = Arc::new(HeadlessPresenter::new(Duration::from_secs(1)));
        Service::with_settings(settings(), presenter).unwrap()
    }

    fn error_code(response: &Response) -> Option<ErrorCode> {
        match &response.result {
            ResponseResult::Err(info) => Some(info.code),
            ResponseResult::Ok(_) => None,
        }
    }

    fn initialize(service: &mut Service) -> Response {
        service.handle_command(
            1,
            Command::Initialize {
                partner_id: "partner".into(),
                app_id: "app".into(),
                base_url: None,
            },
        )
    }

    #[tokio::test]
    async fn ping_and_invalid_json() {
        let mut service = service();

        let (response, shutdown) = service.handle_line(r#"{"request_id":5,"command":{"type":"ping"}}"#);
        assert_eq!(response.request_id, 5);
        assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Pong)));
        assert!(!shutdown);

        let (response, _) = service.handle_line("{not json");
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));
    }

    #[tokio::test]
    async fn slot_commands_before_initialize() {
        let mut service = service();
        let main = PlacementId::new("main");

        let response = service.handle_command(1, Command::Load { placement: main.clone() });
        assert_eq!(error_code(&response), Some(ErrorCode::NotInitialized));

        let response = service.handle_command(2, Command::Show { placement: main.clone() });
        assert_eq!(error_code(&response), Some(ErrorCode::NotInitialized));
    }

    #[tokio::test]
    async fn initialize_attaches_configured_placements() {
        let mut service = service();

        let response = initialize(&mut service);
        assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Initialized)));
        assert_eq!(service.ad_gate.placements(), vec![PlacementId::new("main")]);

        let response = service.handle_command(
            2,
            Command::IsReady {
                placement: PlacementId::new("main"),
            },
        );
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::Ready { ready: false })
        ));

        let response = service.handle_command(
            3,
            Command::Destroy {
                placement: PlacementId::new("unknown"),
            },
        );
        assert_eq!(error_code(&response), Some(ErrorCode::NotInitialized));
    }

    #[tokio::test]
    async fn initialize_rejects_bad_base_url() {
        let mut service = service();

        let response = service.handle_command(
            1,
            Command::Initialize {
                partner_id: "partner".into(),
                app_id: "app".into(),
                base_url: Some("ftp://example.com".into()),
            },
        );
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));
        assert!(!service.ad_gate.is_initialized());
    }

    #[tokio::test]
    async fn gate_commands() {
        let mut service = service();

        // Session gate is closed right after start
        let response = service.handle_command(1, Command::CanShowAd);
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::CanShow { allowed: false })
        ));

        service.handle_command(
            2,
            Command::UpdateServerRestrictions {
                cooldown_seconds: Some(10),
                session_gate_seconds: Some(0),
                ttl_seconds: Some(3600),
            },
        );
        let response = service.handle_command(3, Command::CanShowAd);
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::CanShow { allowed: true })
        ));

        service.handle_command(4, Command::DidShowAd);
        match service.handle_command(5, Command::GetState).result {
            ResponseResult::Ok(ResponsePayload::State(state)) => {
                assert!(!state.gate.allowed);
                assert_eq!(state.gate.effective_cooldown, Duration::from_secs(10));
                assert!(state.server_override.is_some());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn shutdown_command_stops_loop() {
        let mut service = service();
        let (response, shutdown) =
            service.handle_line(r#"{"request_id":9,"command":{"type":"shutdown"}}"#);
        assert!(shutdown);
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::ShuttingDown)
        ));
    }
}
