use std::path::PathBuf;

/// Everything that can go wrong while converting, splitting or renaming.
///
/// Errors returned by [`crate::importer::read_export`] concern the whole file
/// and abort the run. Everything else is scoped to one conversation or part.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("{} is not valid JSON: {source}", path.display())]
    MalformedInput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("broken message graph: {0}")]
    Structural(String),

    #[error("unreadable timestamp {0:?}")]
    Timestamp(String),

    #[error("could not determine a title and creation date for {}", path.display())]
    NameResolution { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_file() {
        let err = ConvertError::InputNotFound {
            path: "conversations.json".into(),
        };
        assert_eq!(err.to_string(), "input file not found: conversations.json");
    }
}
