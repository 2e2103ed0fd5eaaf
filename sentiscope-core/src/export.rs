//! Flat CSV form of post tables.
//!
//! Header: `Title,Subreddit,Post Time,Text,Link[,Sentiment]`. The normalized
//! classifier text is never written, so re-imported labeled rows carry an
//! empty `normalized_text`.

use crate::{CoreError, ExportError, LabeledPost, Post, PostTable, PostTime, Sentiment};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

const POST_COLUMNS: [&str; 5] = ["Title", "Subreddit", "Post Time", "Text", "Link"];
const LABELED_COLUMNS: [&str; 6] = ["Title", "Subreddit", "Post Time", "Text", "Link", "Sentiment"];

#[derive(Debug, Serialize, Deserialize)]
struct PostRecord {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Subreddit")]
    source: String,
    #[serde(rename = "Post Time")]
    post_time: String,
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "Link")]
    link: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LabeledRecord {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Subreddit")]
    source: String,
    #[serde(rename = "Post Time")]
    post_time: String,
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "Link")]
    link: String,
    #[serde(rename = "Sentiment")]
    sentiment: String,
}

pub fn write_table<W: Write>(table: &PostTable, writer: W) -> Result<(), CoreError> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in table.iter() {
        writer
            .serialize(LabeledRecord {
                title: row.title.clone(),
                source: row.source.clone(),
                post_time: row.post_time.to_string(),
                text: row.text.clone(),
                link: row.link.clone(),
                sentiment: row.sentiment.to_string(),
            })
            .map_err(ExportError::from)?;
    }
    if table.is_empty() {
        writer
            .write_record(LABELED_COLUMNS)
            .map_err(ExportError::from)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_table<R: Read>(query: &str, reader: R) -> Result<PostTable, CoreError> {
    let mut reader = csv::Reader::from_reader(reader);
    require_columns(&mut reader, &LABELED_COLUMNS)?;

    let mut rows = Vec::new();
    for record in reader.deserialize::<LabeledRecord>() {
        let record = record.map_err(ExportError::from)?;
        rows.push(LabeledPost {
            title: record.title,
            source: record.source,
            post_time: PostTime::new(record.post_time),
            text: record.text,
            link: record.link,
            sentiment: Sentiment::from_label(&record.sentiment),
            normalized_text: String::new(),
        });
    }
    Ok(PostTable::new(query, rows))
}

pub fn write_posts<W: Write>(posts: &[Post], writer: W) -> Result<(), CoreError> {
    let mut writer = csv::Writer::from_writer(writer);
    for post in posts {
        writer
            .serialize(PostRecord {
                title: post.title.clone(),
                source: post.source.clone(),
                post_time: post.post_time.to_string(),
                text: post.text.clone(),
                link: post.link.clone(),
            })
            .map_err(ExportError::from)?;
    }
    if posts.is_empty() {
        writer.write_record(POST_COLUMNS).map_err(ExportError::from)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads an unlabeled table. An empty `Text` field is read as absent.
pub fn read_posts<R: Read>(reader: R) -> Result<Vec<Post>, CoreError> {
    let mut reader = csv::Reader::from_reader(reader);
    require_columns(&mut reader, &POST_COLUMNS)?;

    let mut posts = Vec::new();
    for (index, record) in reader.deserialize::<PostRecord>().enumerate() {
        let record = record.map_err(ExportError::from)?;
        if record.source.is_empty() {
            return Err(ExportError::EmptyField {
                row: index + 1,
                column: "Subreddit".to_string(),
            }
            .into());
        }
        posts.push(Post {
            title: record.title,
            source: record.source,
            post_time: PostTime::new(record.post_time),
            text: record.text,
            link: record.link,
        });
    }
    Ok(posts)
}

pub fn export_table(table: &PostTable, path: &Path) -> Result<(), CoreError> {
    let file = File::create(path)?;
    write_table(table, file)?;
    info!("Exported {} rows to {}", table.len(), path.display());
    Ok(())
}

pub fn import_table(query: &str, path: &Path) -> Result<PostTable, CoreError> {
    let file = File::open(path)?;
    let table = read_table(query, file)?;
    info!("Imported {} rows from {}", table.len(), path.display());
    Ok(table)
}

pub fn save_posts(posts: &[Post], path: &Path) -> Result<(), CoreError> {
    let file = File::create(path)?;
    write_posts(posts, file)?;
    info!("Saved {} unlabeled posts to {}", posts.len(), path.display());
    Ok(())
}

pub fn load_posts(path: &Path) -> Result<Vec<Post>, CoreError> {
    let file = File::open(path)?;
    let posts = read_posts(file)?;
    info!("Loaded {} unlabeled posts from {}", posts.len(), path.display());
    Ok(posts)
}

fn require_columns<R: Read>(
    reader: &mut csv::Reader<R>,
    columns: &[&str],
) -> Result<(), CoreError> {
    let headers = reader.headers().map_err(ExportError::from)?;
    for column in columns {
        if !headers.iter().any(|header| header == *column) {
            return Err(ExportError::MissingColumn {
                column: column.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(title: &str, text: &str, sentiment: Sentiment) -> LabeledPost {
        LabeledPost {
            title: title.to_string(),
            source: "rust".to_string(),
            post_time: PostTime::new("05/2024"),
            text: text.to_string(),
            link: "https://www.reddit.com/r/rust/comments/abc".to_string(),
            sentiment,
            normalized_text: format!("{} {}", title, text).to_lowercase(),
        }
    }

    #[test]
    fn test_labeled_table_round_trip() {
        let table = PostTable::new(
            "borrow checker",
            vec![
                labeled("Loving it", "so, \"quoted\"\nand multiline", Sentiment::Positive),
                labeled("Link post", "", Sentiment::Neutral),
                labeled("Ugh", "lifetimes", Sentiment::Other("LABEL_9".to_string())),
            ],
        );

        let mut buffer = Vec::new();
        write_table(&table, &mut buffer).unwrap();
        let header = String::from_utf8(buffer.clone()).unwrap();
        assert!(header.starts_with("Title,Subreddit,Post Time,Text,Link,Sentiment"));

        let restored = read_table("borrow checker", buffer.as_slice()).unwrap();
        assert_eq!(restored.len(), 3);
        for (original, restored) in table.iter().zip(restored.iter()) {
            assert_eq!(restored.title, original.title);
            assert_eq!(restored.source, original.source);
            assert_eq!(restored.text, original.text);
            assert_eq!(restored.link, original.link);
            assert_eq!(restored.sentiment, original.sentiment);
            assert_eq!(restored.post_time, original.post_time);
            assert!(restored.normalized_text.is_empty());
        }
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let mut buffer = Vec::new();
        write_table(&PostTable::empty("nothing"), &mut buffer).unwrap();
        let restored = read_table("nothing", buffer.as_slice()).unwrap();
        assert!(restored.is_empty());
    }

    fn unlabeled(title: &str, source: &str, text: Option<&str>) -> Post {
        Post {
            title: title.to_string(),
            source: source.to_string(),
            post_time: PostTime::new("03/2024"),
            text: text.map(str::to_string),
            link: format!("https://www.reddit.com/r/{}/comments/{}", source, title),
        }
    }

    #[test]
    fn test_unlabeled_posts_round_trip() {
        let posts = vec![
            unlabeled("first", "rust", Some("commas, \"quotes\" and\nnewlines")),
            unlabeled("link-only", "learnrust", None),
        ];

        let mut buffer = Vec::new();
        write_posts(&posts, &mut buffer).unwrap();
        let written = String::from_utf8(buffer.clone()).unwrap();
        assert!(written.starts_with("Title,Subreddit,Post Time,Text,Link\n"));

        let restored = read_posts(buffer.as_slice()).unwrap();
        assert_eq!(restored, posts);
    }

    #[test]
    fn test_empty_post_list_keeps_header() {
        let mut buffer = Vec::new();
        write_posts(&[], &mut buffer).unwrap();
        assert!(read_posts(buffer.as_slice()).unwrap().is_empty());
    }

    #[test]
    fn test_blank_subreddit_is_rejected() {
        let csv = "Title,Subreddit,Post Time,Text,Link\nA,,01/2024,x,https://a\n";
        match read_posts(csv.as_bytes()) {
            Err(CoreError::Export(ExportError::EmptyField { row, column })) => {
                assert_eq!(row, 1);
                assert_eq!(column, "Subreddit");
            }
            other => panic!("Expected EmptyField, got {:?}", other),
        }
    }

    #[test]
    fn test_posts_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "sentiscope-posts-{}.csv",
            std::process::id()
        ));
        let posts = vec![unlabeled("saved", "rust", Some("body"))];

        save_posts(&posts, &path).unwrap();
        let loaded = load_posts(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, posts);
    }

    #[test]
    fn test_unlabeled_empty_text_is_absent() {
        let csv = "Title,Subreddit,Post Time,Text,Link\n\
                   A,rust,01/2024,,https://a\n\
                   B,rust,02/2024,body,https://b\n";
        let posts = read_posts(csv.as_bytes()).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].text, None);
        assert_eq!(posts[1].text.as_deref(), Some("body"));
    }

    #[test]
    fn test_missing_column_is_reported() {
        let csv = "Title,Post Time,Text,Link\nA,01/2024,x,https://a\n";
        match read_posts(csv.as_bytes()) {
            Err(CoreError::Export(ExportError::MissingColumn { column })) => {
                assert_eq!(column, "Subreddit")
            }
            other => panic!("Expected MissingColumn, got {:?}", other),
        }
    }
}
