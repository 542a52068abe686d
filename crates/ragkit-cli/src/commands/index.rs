use std::io::BufRead;
use std::path::Path;

use anyhow::{bail, Context};
use candle_core::{Device, Tensor};
use serde::Deserialize;
use tracing::info;

use ragkit_index::VectorStore;

use crate::config::AppConfig;

/// One line of the build input.
#[derive(Debug, Deserialize, PartialEq)]
struct Record {
    id: String,
    vector: Vec<f32>,
}

/// Build the index from a JSONL file of `{"id": .., "vector": [..]}` lines
/// and save it to the configured path.
pub fn build(input: &Path, config: &AppConfig) -> anyhow::Result<()> {
    let records = read_records(input)?;
    let (vectors, ids) = to_tensor(records, config.index.dim)?;

    let mut store = VectorStore::new(config.index.clone());
    store.build_index(&vectors, ids)?;
    store.save_index()?;

    println!(
        "Indexed {} vector(s) of width {} into {}",
        store.len(),
        store.dim(),
        store.path().display()
    );
    Ok(())
}

/// Load the saved index and print the best matches for one query vector.
pub fn search(vector: &str, top_k: usize, config: &AppConfig) -> anyhow::Result<()> {
    let query = parse_vector(vector)?;
    let mut store: VectorStore = VectorStore::new(config.index.clone());
    store
        .load_index()
        .with_context(|| format!("Failed to load index from {}", store.path().display()))?;

    let hits = store.search_one(&query, top_k)?;
    info!(hits = hits.len(), top_k, "Search complete");
    for hit in hits {
        println!("{}\t{:.6}", hit.id, hit.score);
    }
    Ok(())
}

fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open {}", path.display()))?;
    let mut records = Vec::new();
    for (n, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), n + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn to_tensor(records: Vec<Record>, dim: usize) -> anyhow::Result<(Tensor, Vec<String>)> {
    let mut flat = Vec::with_capacity(records.len() * dim);
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        if record.vector.len() != dim {
            bail!(
                "record '{}' has {} components, index dimension is {dim}",
                record.id,
                record.vector.len()
            );
        }
        flat.extend(record.vector);
        ids.push(record.id);
    }
    let vectors = Tensor::from_vec(flat, (ids.len(), dim), &Device::Cpu)?;
    Ok((vectors, ids))
}

/// Parse `"0.1,0.2,..."` into floats.
fn parse_vector(raw: &str) -> anyhow::Result<Vec<f32>> {
    raw.split(',')
        .map(|s| {
            s.trim()
                .parse::<f32>()
                .with_context(|| format!("'{}' is not a number", s.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("0.5, -1,2e-1").unwrap(), vec![0.5, -1.0, 0.2]);
        assert!(parse_vector("0.5,abc").is_err());
        assert!(parse_vector("").is_err());
    }

    #[test]
    fn test_read_records_skips_blank_lines() {
        let dir = std::env::temp_dir().join("ragkit_cli_records");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("vectors.jsonl");
        std::fs::write(
            &file,
            "{\"id\": \"a\", \"vector\": [1, 0]}\n\n{\"id\": \"b\", \"vector\": [0, 1]}\n",
        )
        .unwrap();

        let records = read_records(&file).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Record { id: "b".to_string(), vector: vec![0.0, 1.0] });
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_to_tensor_checks_width() {
        let records = vec![
            Record { id: "a".to_string(), vector: vec![1.0, 0.0] },
            Record { id: "b".to_string(), vector: vec![1.0] },
        ];
        assert!(to_tensor(records, 2).is_err());
    }

    #[test]
    fn test_build_then_search_roundtrip() {
        let dir = std::env::temp_dir().join("ragkit_cli_index_roundtrip");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("vectors.jsonl");
        std::fs::write(
            &input,
            "{\"id\": \"x\", \"vector\": [1, 0, 0]}\n{\"id\": \"y\", \"vector\": [0, 1, 0]}\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.index.dim = 3;
        config.index.path = dir.join("out").join("index.safetensors");
        build(&input, &config).unwrap();
        assert!(config.index.path.exists());
        search("0,1,0", 1, &config).unwrap();
        std::fs::remove_dir_all(dir).ok();
    }
}
