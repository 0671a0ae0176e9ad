use anyhow::{bail, Context, Result};

use std::fs;
use std::path::{Path, PathBuf};

use super::Newsletter;

/// Paths of one archived issue.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedNewsletter {
    pub html_path: PathBuf,
    pub markdown_path: PathBuf,
}

/// `Weekly_Market_Insights_2024-10-07`
pub fn file_stem(newsletter: &Newsletter) -> String {
    format!("{}_{}", newsletter.title.replace(' ', "_"), newsletter.date)
}

/// Writes the HTML and markdown renditions of `newsletter` under `dir`.
pub fn save(newsletter: &Newsletter, dir: impl AsRef<Path>) -> Result<SavedNewsletter> {
    if newsletter.html_content.trim().is_empty() || newsletter.content.trim().is_empty() {
        bail!("Newsletter content is empty, nothing to save");
    }

    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let stem = file_stem(newsletter);
    let html_path = dir.join(format!("{stem}.html"));
    let markdown_path = dir.join(format!("{stem}.md"));

    fs::write(&html_path, &newsletter.html_content)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    fs::write(&markdown_path, &newsletter.content)
        .with_context(|| format!("Failed to write {}", markdown_path.display()))?;

    tracing::info!("Newsletter saved to {}", html_path.display());

    Ok(SavedNewsletter {
        html_path,
        markdown_path,
    })
}

#[cfg(test)]
mod archive_tests {
    use super::*;
    use crate::newsletter::RawData;
    use tempfile::tempdir;

    fn newsletter(content: &str) -> Newsletter {
        Newsletter {
            title: "Weekly Market Insights".into(),
            date: "2024-10-07".into(),
            content: content.into(),
            html_content: if content.is_empty() {
                String::new()
            } else {
                format!("<p>{content}</p>")
            },
            raw_data: RawData::default(),
        }
    }

    #[test]
    fn test_save_writes_both_files() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("newsletters");

        let saved = save(&newsletter("hello"), &out).unwrap();

        assert_eq!(
            saved.html_path,
            out.join("Weekly_Market_Insights_2024-10-07.html")
        );
        assert_eq!(fs::read_to_string(&saved.html_path).unwrap(), "<p>hello</p>");
        assert_eq!(fs::read_to_string(&saved.markdown_path).unwrap(), "hello");
    }

    #[test]
    fn test_empty_newsletter_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(save(&newsletter(""), dir.path()).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
