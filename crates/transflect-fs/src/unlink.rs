use tracing::debug;

use transflect_core::{Completion, Exchange, Transflect};

use crate::FsOptions;
use crate::root::resolve;

/// Deletes a file (`DELETE`) and answers 204.
pub struct Unlink {
    options: FsOptions,
}

impl Unlink {
    pub fn new(options: FsOptions) -> Self {
        Self { options }
    }
}

impl Transflect for Unlink {
    fn end<'a>(&'a mut self, cx: &'a mut Exchange<'_>) -> Completion<'a> {
        let root = self.options.root.clone();

        Completion::pending(async move {
            let path = resolve(&root, cx.source().path())?;
            tokio::fs::remove_file(&path).await?;
            debug!(path = %path.display(), "file removed");

            cx.set_status(204)?;
            Ok(None)
        })
    }
}
