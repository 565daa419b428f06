use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Parses a JSON file into a given type `T`.
///
/// Errors are converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path)?;

    let parsed_data: T = serde_json::from_str(&data)?;

    Ok(parsed_data)
}

/// Writes a value as pretty JSON, creating parent directories as needed.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_write_then_parse_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");

        let sample = Sample { name: "court".to_string(), count: 7 };
        write_json_file(&path, &sample).unwrap();

        let parsed: Sample = parse_json_file(path.to_str().unwrap()).unwrap();
        assert_eq!(parsed, sample);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result: Result<Sample> = parse_json_file("/no/such/file.json");
        assert!(result.is_err());
    }
}
