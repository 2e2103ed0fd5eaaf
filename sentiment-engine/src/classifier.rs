use crate::normalize::combine_title_and_text;
use futures::stream::{self, StreamExt, TryStreamExt};
use sentiscope_core::{
    ClassifierError, CoreError, LabeledPost, Post, PostTable, Sentiment, SentimentModel,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Turns fetched posts into a labeled [`PostTable`] using a [`SentimentModel`].
#[derive(Clone)]
pub struct SentimentClassifier {
    model: Arc<dyn SentimentModel>,
    max_concurrent_batches: usize,
}

impl SentimentClassifier {
    pub fn new(model: Arc<dyn SentimentModel>) -> Self {
        Self {
            model,
            max_concurrent_batches: 1,
        }
    }

    pub fn with_max_concurrent_batches(mut self, max_concurrent_batches: usize) -> Self {
        self.max_concurrent_batches = max_concurrent_batches.max(1);
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Labels every post that has text. Rows without text are dropped,
    /// the rest keep their input order.
    pub async fn classify(
        &self,
        query: &str,
        posts: Vec<Post>,
        batch_size: usize,
        max_length: usize,
    ) -> Result<PostTable, CoreError> {
        if batch_size == 0 {
            return Err(CoreError::invalid_input("Batch size must be at least 1"));
        }

        let started = Instant::now();
        let total = posts.len();
        let rows: Vec<(Post, String, String)> = posts
            .into_iter()
            .filter_map(|mut post| {
                let text = post.text.take()?;
                let normalized = combine_title_and_text(&post.title, &text);
                Some((post, text, normalized))
            })
            .collect();

        if rows.len() < total {
            debug!("Dropped {} posts without text", total - rows.len());
        }
        if rows.is_empty() {
            return Ok(PostTable::empty(query));
        }

        let texts: Vec<String> = rows.iter().map(|(_, _, normalized)| normalized.clone()).collect();
        let batch_count = texts.len().div_ceil(batch_size);
        info!(
            "Classifying {} posts in {} batches with {}",
            texts.len(),
            batch_count,
            self.model.name()
        );

        let model = &self.model;
        let pending: Vec<_> = texts
            .chunks(batch_size)
            .enumerate()
            .map(|(index, batch)| classify_chunk(model, index, batch, max_length))
            .collect();
        let batches: Vec<Vec<Sentiment>> = stream::iter(pending)
            .buffered(self.max_concurrent_batches)
            .try_collect()
            .await?;

        let labeled: Vec<LabeledPost> = rows
            .into_iter()
            .zip(batches.into_iter().flatten())
            .map(|((post, text, normalized), sentiment)| {
                LabeledPost::new(post, text, normalized, sentiment)
            })
            .collect();

        info!(
            "Classified {} posts in {:?}",
            labeled.len(),
            started.elapsed()
        );
        Ok(PostTable::new(query, labeled))
    }
}

async fn classify_chunk(
    model: &Arc<dyn SentimentModel>,
    index: usize,
    batch: &[String],
    max_length: usize,
) -> Result<Vec<Sentiment>, CoreError> {
    let predictions = model.classify_batch(batch, true, max_length).await?;
    if predictions.len() != batch.len() {
        return Err(CoreError::from(ClassifierError::MisalignedBatch {
            expected: batch.len(),
            actual: predictions.len(),
        }));
    }
    debug!("Batch {} classified ({} texts)", index, batch.len());
    Ok::<Vec<Sentiment>, CoreError>(
        predictions
            .into_iter()
            .map(|prediction| Sentiment::from_label(&prediction.label))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentiscope_core::{PostTime, Prediction};
    use std::sync::Mutex;

    /// Labels by keyword and records every batch it receives.
    #[derive(Default)]
    struct KeywordModel {
        batches: Mutex<Vec<Vec<String>>>,
        short_by: usize,
    }

    #[async_trait]
    impl SentimentModel for KeywordModel {
        async fn classify_batch(
            &self,
            texts: &[String],
            truncation: bool,
            max_length: usize,
        ) -> Result<Vec<Prediction>, CoreError> {
            assert!(truncation);
            assert_eq!(max_length, 512);
            self.batches.lock().unwrap().push(texts.to_vec());

            let keep = texts.len().saturating_sub(self.short_by);
            Ok(texts
                .iter()
                .take(keep)
                .map(|text| {
                    let label = if text.contains("love") {
                        "POSITIVE"
                    } else if text.contains("hate") {
                        "negative"
                    } else {
                        "Neutral"
                    };
                    Prediction {
                        label: label.to_string(),
                        score: Some(0.9),
                    }
                })
                .collect())
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn post(title: &str, text: Option<&str>) -> Post {
        Post {
            title: title.to_string(),
            source: "rust".to_string(),
            post_time: PostTime::new("05/2024"),
            text: text.map(str::to_string),
            link: format!("https://www.reddit.com/r/rust/{}", title),
        }
    }

    #[tokio::test]
    async fn test_two_posts_one_batch() {
        let model = Arc::new(KeywordModel::default());
        let classifier = SentimentClassifier::new(model.clone());

        let table = classifier
            .classify(
                "rust",
                vec![post("A", Some("I love it")), post("B", Some("I hate it"))],
                2,
                512,
            )
            .await
            .unwrap();

        let labels: Vec<_> = table.iter().map(|row| row.sentiment.clone()).collect();
        assert_eq!(labels, vec![Sentiment::Positive, Sentiment::Negative]);
        assert_eq!(model.batches.lock().unwrap().len(), 1);
        assert_eq!(table.query(), "rust");
    }

    #[tokio::test]
    async fn test_three_posts_two_batches_keep_order() {
        let model = Arc::new(KeywordModel::default());
        let classifier = SentimentClassifier::new(model.clone()).with_max_concurrent_batches(2);

        let table = classifier
            .classify(
                "rust",
                vec![
                    post("A", Some("meh")),
                    post("B", Some("love")),
                    post("C", Some("hate")),
                ],
                2,
                512,
            )
            .await
            .unwrap();

        let titles: Vec<_> = table.iter().map(|row| row.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        let labels: Vec<_> = table.iter().map(|row| row.sentiment.clone()).collect();
        assert_eq!(
            labels,
            vec![Sentiment::Neutral, Sentiment::Positive, Sentiment::Negative]
        );

        let mut batch_sizes: Vec<_> = model
            .batches
            .lock()
            .unwrap()
            .iter()
            .map(|batch| batch.len())
            .collect();
        batch_sizes.sort_unstable();
        assert_eq!(batch_sizes, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_posts_without_text_are_dropped() {
        let classifier = SentimentClassifier::new(Arc::new(KeywordModel::default()));

        let table = classifier
            .classify(
                "rust",
                vec![
                    post("A", None),
                    post("B", Some("")),
                    post("C", Some("love")),
                ],
                2,
                512,
            )
            .await
            .unwrap();

        let titles: Vec<_> = table.iter().map(|row| row.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "C"]);
        assert_eq!(table.rows()[0].normalized_text, "b");
        assert_eq!(table.rows()[1].text, "love");
    }

    #[tokio::test]
    async fn test_normalized_text_combines_title_and_text() {
        let classifier = SentimentClassifier::new(Arc::new(KeywordModel::default()));

        let table = classifier
            .classify(
                "rust",
                vec![post("Check THIS", Some("https://x.y u/bob loves r/rust"))],
                2,
                512,
            )
            .await
            .unwrap();

        assert_eq!(table.rows()[0].normalized_text, "check this loves");
        assert_eq!(table.rows()[0].text, "https://x.y u/bob loves r/rust");
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let classifier = SentimentClassifier::new(Arc::new(KeywordModel::default()));
        let result = tokio_test::block_on(classifier.classify(
            "rust",
            vec![post("A", Some("x"))],
            0,
            512,
        ));
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_misaligned_batch_is_an_error() {
        let model = Arc::new(KeywordModel {
            short_by: 1,
            ..Default::default()
        });
        let classifier = SentimentClassifier::new(model);

        let result = classifier
            .classify(
                "rust",
                vec![post("A", Some("x")), post("B", Some("y"))],
                2,
                512,
            )
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Classifier(ClassifierError::MisalignedBatch {
                expected: 2,
                actual: 1
            }))
        ));
    }

    #[tokio::test]
    async fn test_no_text_rows_yield_empty_table() {
        let model = Arc::new(KeywordModel::default());
        let classifier = SentimentClassifier::new(model.clone());

        let table = classifier
            .classify("rust", vec![post("A", None)], 2, 512)
            .await
            .unwrap();

        assert!(table.is_empty());
        assert!(model.batches.lock().unwrap().is_empty());
    }
}
