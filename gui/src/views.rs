use crate::{App, Message};
use analytics::{
    Dashboard, DateBounds, ExampleRow, FilterOutcome, KeyMetrics, SentimentCount,
    SourceSentimentCount, SourceShare, TrendPoint,
};
use iced::widget::{
    button, column, container, horizontal_rule, progress_bar, row, scrollable, text, text_input,
    Column,
};
use iced::{Alignment, Color, Element, Length, Theme};
use sentiscope_core::Sentiment;

const EXAMPLES_PER_SENTIMENT: usize = 5;
const WARNING: Color = Color::from_rgb(0.85, 0.25, 0.2);
const MUTED: Color = Color::from_rgb(0.45, 0.45, 0.45);

pub(crate) fn render(app: &App) -> Element<Message, Theme> {
    let title: Element<Message, Theme> = text("Sentiscope - Reddit Sentiment Analysis")
        .size(24)
        .into();

    let body: Element<Message, Theme> = match app.session.dashboard() {
        Some(dashboard) => row![
            container(sidebar(app)).width(Length::Fixed(260.0)),
            scrollable(dashboard_panel(dashboard)).width(Length::Fill),
        ]
        .spacing(20)
        .into(),
        None => column![
            text("No posts to analyse yet").size(16),
            text("Enter a search query and press Analyse").size(14)
        ]
        .spacing(10)
        .into(),
    };

    let main_content: Element<Message, Theme> =
        column![title, controls(app), status_line(app), horizontal_rule(1), body]
            .spacing(15)
            .into();

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .padding(20)
        .into()
}

fn controls(app: &App) -> Element<Message, Theme> {
    let fetching = app.session.is_fetching();

    let mut query = text_input("Search query", &app.query_input)
        .padding(8)
        .width(Length::Fill);
    let mut limit = text_input("Posts per subreddit", &app.limit_input)
        .padding(8)
        .width(Length::Fixed(160.0));
    let mut analyse = button(if fetching { "Fetching and classifying…" } else { "Analyse" });
    let mut export = button("Export CSV");
    let mut fetch_only = button("Fetch to CSV");
    let mut classify_saved = button("Classify saved");
    let mut import = button("Import CSV");

    if !fetching {
        query = query
            .on_input(Message::QueryChanged)
            .on_submit(Message::Analyse);
        limit = limit.on_input(Message::LimitChanged);
        analyse = analyse.on_press(Message::Analyse);
        fetch_only = fetch_only.on_press(Message::FetchToFile);
        classify_saved = classify_saved.on_press(Message::ClassifySaved);
        import = import.on_press(Message::Import);
        if app.session.table().is_some() {
            export = export.on_press(Message::Export);
        }
    }

    column![
        row![query, limit, analyse]
            .spacing(10)
            .align_items(Alignment::Center),
        row![fetch_only, classify_saved, import, export].spacing(10),
    ]
    .spacing(8)
    .into()
}

fn status_line(app: &App) -> Element<Message, Theme> {
    let mut lines = Column::new().spacing(4);
    if app.session.is_fetching() {
        lines = lines.push(text(format!("Fetching and classifying posts for '{}'…", app.session.query())).size(14));
    }
    if let Some(error) = app.session.last_error() {
        lines = lines.push(
            text(format!("Warning: {} Showing the previous results.", error))
                .size(14)
                .style(WARNING),
        );
    }
    if let Some(notice) = app.notice() {
        lines = lines.push(text(notice).size(14).style(MUTED));
    }
    lines.into()
}

fn sidebar(app: &App) -> Element<Message, Theme> {
    let selection = app.session.selection();

    let mut sources = Column::new().spacing(4);
    for source in app.session.available_sources() {
        let mark = if selection.sources.contains(&source) { "x" } else { " " };
        sources = sources.push(
            button(text(format!("[{}] r/{}", mark, source)).size(14))
                .on_press(Message::ToggleSource(source))
                .width(Length::Fill),
        );
    }

    let bounds_label = match selection.window.bounds {
        DateBounds::Inclusive => "Bounds: inclusive",
        DateBounds::Exclusive => "Bounds: exclusive",
    };

    let range_hint: Element<Message, Theme> = match app.session.date_range() {
        Some((min, max)) => text(format!("Data covers {} to {}", min, max))
            .size(12)
            .style(MUTED)
            .into(),
        None => text("No dated rows").size(12).style(MUTED).into(),
    };

    column![
        text("Subreddits").size(18),
        row![
            button("Select all").on_press(Message::SelectAllSources),
            button("Clear").on_press(Message::ClearSources),
        ]
        .spacing(8),
        scrollable(sources).height(Length::Fixed(280.0)),
        text("Date range").size(18),
        text_input("Start (YYYY-MM-DD)", &app.start_input)
            .on_input(Message::StartDateChanged)
            .on_submit(Message::ApplyDates)
            .padding(6),
        text_input("End (YYYY-MM-DD)", &app.end_input)
            .on_input(Message::EndDateChanged)
            .on_submit(Message::ApplyDates)
            .padding(6),
        range_hint,
        row![
            button("Apply").on_press(Message::ApplyDates),
            button(bounds_label).on_press(Message::BoundsToggled),
        ]
        .spacing(8),
    ]
    .spacing(10)
    .into()
}

fn dashboard_panel<'a>(dashboard: Dashboard) -> Element<'a, Message, Theme> {
    if let FilterOutcome::Empty { reason } = dashboard.outcome {
        return text(reason.to_string()).size(16).style(MUTED).into();
    }

    column![
        metrics_row(&dashboard.metrics),
        section("Sentiment distribution", distribution(&dashboard.distribution, dashboard.metrics.total)),
        section("Sentiment over time", trend(&dashboard.trend)),
        section("Subreddit contribution", contribution(&dashboard.contribution)),
        section("Subreddit contribution by sentiment", contribution_by_sentiment(&dashboard.contribution_by_sentiment)),
        section("Positive examples", examples(&dashboard.examples.positive)),
        section("Neutral examples", examples(&dashboard.examples.neutral)),
        section("Negative examples", examples(&dashboard.examples.negative)),
    ]
    .spacing(20)
    .padding(10)
    .into()
}

fn section<'a>(title: &str, content: Element<'a, Message, Theme>) -> Element<'a, Message, Theme> {
    column![text(title.to_string()).size(18), content].spacing(8).into()
}

fn metrics_row<'a>(metrics: &KeyMetrics) -> Element<'a, Message, Theme> {
    let metric = |label: &str, value: usize| -> Element<'a, Message, Theme> {
        container(column![text(label.to_string()).size(12).style(MUTED), text(value).size(28)].spacing(4))
            .padding(10)
            .width(Length::FillPortion(1))
            .into()
    };

    row![
        metric("Total posts", metrics.total),
        metric("Positive", metrics.positive),
        metric("Neutral", metrics.neutral),
        metric("Negative", metrics.negative),
    ]
    .spacing(10)
    .into()
}

fn distribution<'a>(counts: &[SentimentCount], total: usize) -> Element<'a, Message, Theme> {
    let mut bars = Column::new().spacing(6);
    for count in counts {
        let share = share_of(count.count, total);
        bars = bars.push(
            row![
                text(count.sentiment.to_string()).width(Length::Fixed(90.0)),
                progress_bar(0.0..=1.0, share).height(Length::Fixed(14.0)).width(Length::Fixed(240.0)),
                text(format!("{:.1}% ({})", share * 100.0, count.count)),
            ]
            .spacing(10)
            .align_items(Alignment::Center),
        );
    }
    bars.into()
}

fn trend<'a>(points: &[TrendPoint]) -> Element<'a, Message, Theme> {
    let peak = points.iter().map(|p| p.count).max().unwrap_or(0);
    let mut rows = Column::new().spacing(4);
    let mut current: Option<&Sentiment> = None;

    for point in points {
        if current != Some(&point.sentiment) {
            rows = rows.push(text(point.sentiment.to_string()).size(14));
            current = Some(&point.sentiment);
        }
        rows = rows.push(
            row![
                text(point.bucket.format("%m/%Y").to_string())
                    .size(12)
                    .width(Length::Fixed(90.0)),
                progress_bar(0.0..=1.0, share_of(point.count, peak))
                    .height(Length::Fixed(10.0))
                    .width(Length::Fixed(240.0)),
                text(point.count).size(12),
            ]
            .spacing(10)
            .align_items(Alignment::Center),
        );
    }
    rows.into()
}

fn contribution<'a>(shares: &[SourceShare]) -> Element<'a, Message, Theme> {
    let mut rows = Column::new().spacing(6);
    for share in shares {
        rows = rows.push(
            row![
                text(format!("r/{}", share.source)).width(Length::Fixed(160.0)),
                progress_bar(0.0..=1.0, share.share as f32)
                    .height(Length::Fixed(14.0))
                    .width(Length::Fixed(240.0)),
                text(format!("{:.1}% ({})", share.share * 100.0, share.count)),
            ]
            .spacing(10)
            .align_items(Alignment::Center),
        );
    }
    rows.into()
}

fn contribution_by_sentiment<'a>(counts: &[SourceSentimentCount]) -> Element<'a, Message, Theme> {
    let mut rows = Column::new().spacing(2);
    for count in counts {
        rows = rows.push(
            text(format!("r/{:<20} {:<10} {}", count.source, count.sentiment, count.count)).size(13),
        );
    }
    rows.into()
}

fn examples<'a>(rows: &[ExampleRow]) -> Element<'a, Message, Theme> {
    if rows.is_empty() {
        return text("No posts").size(13).style(MUTED).into();
    }

    let mut list = Column::new().spacing(10);
    for example in rows.iter().take(EXAMPLES_PER_SENTIMENT) {
        list = list.push(
            container(
                column![
                    text(&example.title).size(15),
                    text(format!("r/{} - {}", example.source, example.post_time))
                        .size(12)
                        .style(MUTED),
                    text(truncate(&example.text, 280)).size(13),
                    text(&example.link).size(11).style(MUTED),
                ]
                .spacing(4),
            )
            .padding(8),
        );
    }
    if rows.len() > EXAMPLES_PER_SENTIMENT {
        list = list.push(
            text(format!("and {} more", rows.len() - EXAMPLES_PER_SENTIMENT))
                .size(12)
                .style(MUTED),
        );
    }
    list.into()
}

fn share_of(count: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        count as f32 / total as f32
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", &value[..end]),
        None => value.to_string(),
    }
}
