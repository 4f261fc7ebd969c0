use transflect_core::{Completion, Exchange, Transflect};

use crate::FsOptions;
use crate::root::resolve;

/// Lists a directory as HTML links (any path ending in `/`).
pub struct ListDir {
    options: FsOptions,
}

impl ListDir {
    pub fn new(options: FsOptions) -> Self {
        Self { options }
    }
}

impl Transflect for ListDir {
    fn end<'a>(&'a mut self, cx: &'a mut Exchange<'_>) -> Completion<'a> {
        let root = self.options.root.clone();

        Completion::pending(async move {
            let base = cx.source().path().to_string();
            let dir = resolve(&root, &base)?;

            let mut entries = Vec::new();
            let mut reader = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = reader.next_entry().await? {
                let is_dir = entry.file_type().await?.is_dir();
                entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
            }
            entries.sort();

            cx.set_header("content-type", "text/html")?;
            Ok(Some(render(&base, &entries).into()))
        })
    }
}

/// One `<div><a href=...>name</a></div>` line per entry, directories
/// with a trailing slash on the link.
pub fn render(base: &str, entries: &[(String, bool)]) -> String {
    entries
        .iter()
        .map(|(name, is_dir)| {
            let slash = if *is_dir { "/" } else { "" };
            format!(r#"<div><a href="{base}{name}{slash}">{name}</a></div>"#)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_links() {
        let entries = vec![("a.txt".to_string(), false), ("sub".to_string(), true)];
        assert_eq!(
            render("/docs/", &entries),
            "<div><a href=\"/docs/a.txt\">a.txt</a></div>\n<div><a href=\"/docs/sub/\">sub</a></div>"
        );
    }

    #[test]
    fn empty_directory_renders_nothing() {
        assert_eq!(render("/", &[]), "");
    }
}
