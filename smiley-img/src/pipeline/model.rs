use crate::error::{Resource, Result, SmileyError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use tracing::{Level, span};

pub type Model = rustface::Model;

pub fn initialize_model(path: &Path) -> Result<Model> {
    let span = span!(Level::DEBUG, "initialize_model");
    let _guard = span.enter();

    let file = File::open(path)
        .map_err(|e| SmileyError::startup(Resource::Model, format!("{}: {e}", path.display())))?;
    parse_model(BufReader::new(file), &path.display().to_string())
}

/// rustface panics on unknown classifier kinds instead of returning an error.
pub fn parse_model<R: Read>(reader: R, source: &str) -> Result<Model> {
    match catch_unwind(AssertUnwindSafe(|| rustface::read_model(reader))) {
        Ok(Ok(model)) => Ok(model),
        Ok(Err(e)) => Err(SmileyError::startup(Resource::Model, format!("{source}: {e}"))),
        Err(_) => Err(SmileyError::startup(
            Resource::Model,
            format!("{source}: unrecognized classifier in model"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn le_words(words: &[i32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn parse_err(words: &[i32], source: &str) -> SmileyError {
        match parse_model(Cursor::new(le_words(words)), source) {
            Ok(_) => panic!("{source} should not parse"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_empty_model_parses() {
        let model = parse_model(Cursor::new(le_words(&[0])), "empty").unwrap();
        assert_eq!(model.get_hierarchy_count(), 0);
    }

    #[test]
    fn test_unknown_classifier_is_startup_error() {
        // one hierarchy of one stage whose classifier kind is 7
        let err = parse_err(&[1, 1, 1, 7], "corrupt.bin");

        assert!(matches!(
            err,
            SmileyError::StartupResource {
                resource: Resource::Model,
                ..
            }
        ));
        assert!(err.to_string().contains("corrupt.bin"));
    }

    #[test]
    fn test_truncated_model_is_startup_error() {
        let err = parse_err(&[1, 1], "short.bin");
        assert!(matches!(
            err,
            SmileyError::StartupResource {
                resource: Resource::Model,
                ..
            }
        ));
    }
}
