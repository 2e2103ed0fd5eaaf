use anyhow::Context;
use collector::FetchOrchestrator;
use gui::{App, Services};
use iced::{Application, Settings};
use reddit_client::RedditClient;
use sentiment_engine::SentimentClassifier;
use sentiscope_core::{AppConfig, PostSource};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "sentiscope=info,collector=info,reddit_client=info,sentiment_engine=info,analytics=info,gui=info";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting Sentiscope - Reddit Sentiment Analysis");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let source: Arc<dyn PostSource> =
        Arc::new(RedditClient::new(&config.reddit).context("Failed to set up the Reddit client")?);
    let fetcher = FetchOrchestrator::new(source, config.fetch.clone());
    let classifier = SentimentClassifier::from_config(&config.classifier)
        .context("Failed to set up the sentiment classifier")?;
    tracing::info!("Using sentiment model {}", classifier.model_name());

    let services = Services {
        fetcher: Arc::new(fetcher),
        classifier: Arc::new(classifier),
        config,
    };

    let settings = Settings {
        window: iced::window::Settings {
            size: iced::Size::new(1200.0, 800.0),
            min_size: Some(iced::Size::new(800.0, 600.0)),
            ..Default::default()
        },
        ..Settings::with_flags(services)
    };

    SentiscopeApp::run(settings).map_err(|e| {
        tracing::error!("Application error: {}", e);
        anyhow::anyhow!("GUI error: {e}")
    })
}

struct SentiscopeApp {
    app: App,
}

impl Application for SentiscopeApp {
    type Message = gui::Message;
    type Theme = iced::Theme;
    type Executor = iced::executor::Default;
    type Flags = Services;

    fn new(flags: Self::Flags) -> (Self, iced::Command<Self::Message>) {
        tracing::info!("Initializing application");
        (Self { app: App::new(flags) }, iced::Command::none())
    }

    fn title(&self) -> String {
        let query = self.app.session().query();
        if query.is_empty() {
            "Sentiscope".to_string()
        } else {
            format!("Sentiscope - {}", query)
        }
    }

    fn update(&mut self, message: Self::Message) -> iced::Command<Self::Message> {
        self.app.update(message)
    }

    fn view(&self) -> iced::Element<Self::Message> {
        self.app.view()
    }
}
