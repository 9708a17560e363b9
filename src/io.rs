use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::Array2;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::clustering::Method;
use crate::experiment::{Comparison, ExperimentConfig, Sweep};

/// A feature matrix loaded from disk, with dense label ids.
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
    /// `classes[id]` is the label text behind id `id`.
    pub classes: Vec<String>,
}

fn parse_row(record: &csv::StringRecord, skip: Option<usize>, line: usize) -> Result<Vec<f64>> {
    record
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(i, s)| {
            s.parse::<f64>()
                .with_context(|| format!("line {line}, column {}: {s:?} is not a number", i + 1))
        })
        .collect()
}

fn to_matrix(rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if let Some(i) = rows.iter().position(|r| r.len() != n_cols) {
        bail!("row {} has {} values, expected {n_cols}", i + 1, rows[i].len());
    }
    let data = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((n_rows, n_cols), data)?)
}

/// Reads a square similarity matrix: a header `,id1,id2,...` followed by
/// one `id,values...` row per item.
pub fn read_matrix_csv<P: AsRef<Path>>(path: P) -> Result<(Vec<String>, Array2<f64>)> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut ids = vec![];
    let mut rows = vec![];
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let id = record.get(0).unwrap_or_default().to_string();
        let row = parse_row(&record, Some(0), i + 2)?;
        ids.push(id);
        rows.push(row);
    }

    let matrix = to_matrix(rows)?;
    if matrix.ncols() != matrix.nrows() {
        bail!(
            "similarity matrix must be square, found {}x{}",
            matrix.nrows(),
            matrix.ncols()
        );
    }
    Ok((ids, matrix))
}

/// Reads numeric features plus one label column. The label column is
/// `label_column` when given, the last column otherwise.
pub fn read_labeled_csv<P: AsRef<Path>>(path: P, label_column: Option<&str>) -> Result<LabeledData> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = rdr.headers()?.clone();
    let label_idx = match label_column {
        Some(name) => headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("no column named {name:?}"))?,
        None if headers.is_empty() => bail!("file has no columns"),
        None => headers.len() - 1,
    };

    let mut raw_labels = vec![];
    let mut rows = vec![];
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        raw_labels.push(record.get(label_idx).unwrap_or_default().to_string());
        rows.push(parse_row(&record, Some(label_idx), i + 2)?);
    }

    let classes: Vec<String> = raw_labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let ids: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .map(|(id, c)| (c.as_str(), id))
        .collect();
    let labels = raw_labels.iter().map(|l| ids[l.as_str()]).collect();

    Ok(LabeledData {
        features: to_matrix(rows)?,
        labels,
        classes,
    })
}

/// Reads `id,token,token,...` lines (no header, any width) into a lookup
/// table.
pub fn read_metadata_csv<P: AsRef<Path>>(path: P) -> Result<HashMap<String, Vec<String>>> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut metadata = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let mut fields = record.iter();
        if let Some(id) = fields.next() {
            let tokens = fields.filter(|t| !t.is_empty()).map(str::to_string).collect();
            metadata.insert(id.to_string(), tokens);
        }
    }
    Ok(metadata)
}

#[derive(Debug, Serialize)]
struct TrialRecord {
    run: usize,
    method: Method,
    accuracy: f64,
    seconds: f64,
}

/// One `run,method,accuracy,seconds` record per method and repetition.
pub fn write_trials_csv<P: AsRef<Path>>(path: P, comparison: &Comparison) -> Result<()> {
    let file = File::create(path)?;
    let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(file));

    for (run, trial) in comparison.trials.iter().enumerate() {
        for metrics in trial {
            wtr.serialize(TrialRecord {
                run,
                method: metrics.method,
                accuracy: metrics.accuracy,
                seconds: metrics.elapsed.as_secs_f64(),
            })?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct SweepRecord {
    code_length: usize,
    method: Method,
    accuracy_mean: f64,
    accuracy_std: f64,
    seconds_mean: f64,
    seconds_std: f64,
}

pub fn write_sweep_csv<P: AsRef<Path>>(path: P, sweep: &Sweep) -> Result<()> {
    let file = File::create(path)?;
    let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(file));

    for point in &sweep.points {
        for method in Method::ALL {
            let accuracy = point.accuracy[method.index()];
            let seconds = point.seconds[method.index()];
            wtr.serialize(SweepRecord {
                code_length: point.code_length,
                method,
                accuracy_mean: accuracy.mean,
                accuracy_std: accuracy.std,
                seconds_mean: seconds.mean,
                seconds_std: seconds.std,
            })?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// A header line plus one record holding every experiment parameter.
pub fn write_config_csv<P: AsRef<Path>>(path: P, config: &ExperimentConfig) -> Result<()> {
    let file = File::create(path)?;
    let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(file));
    wtr.serialize(config)?;
    wtr.flush()?;
    Ok(())
}

/// Writes every non-empty cluster as a block of `id<TAB>tokens` lines,
/// blocks separated by a blank line.
pub fn write_cluster_dump<P: AsRef<Path>>(
    path: P,
    members: &[Vec<usize>],
    ids: &[String],
    metadata: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    for cluster in members.iter().filter(|m| !m.is_empty()) {
        for &i in cluster {
            let id = ids
                .get(i)
                .with_context(|| format!("member {i} has no identifier"))?;
            let tokens = metadata.get(id).map(|t| t.join(" ")).unwrap_or_default();
            writeln!(out, "{id}\t{tokens}")?;
        }
        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("eccluster-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_read_matrix_csv() {
        let path = temp_path("matrix.csv");
        fs::write(&path, ",a,b,c\na,0,1,0\nb,1,0,1\nc,0,1,0\n").unwrap();

        let (ids, matrix) = read_matrix_csv(&path).unwrap();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(matrix.dim(), (3, 3));
        assert_eq!(matrix[[1, 2]], 1.0);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_read_matrix_csv_rejects_bad_values() {
        let path = temp_path("bad-matrix.csv");
        fs::write(&path, ",a,b\na,0,x\nb,1,0\n").unwrap();
        assert!(read_matrix_csv(&path).is_err());

        fs::write(&path, ",a,b\na,0,1\n").unwrap();
        assert!(read_matrix_csv(&path).is_err());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_read_labeled_csv() {
        let path = temp_path("labeled.csv");
        fs::write(&path, "x,y,kind\n1.0,2.0,cat\n3.0,4.0,dog\n5.0,6.0,cat\n").unwrap();

        let data = read_labeled_csv(&path, None).unwrap();
        assert_eq!(data.features.dim(), (3, 2));
        assert_eq!(data.labels, vec![0, 1, 0]);
        assert_eq!(data.classes, vec!["cat", "dog"]);

        let by_name = read_labeled_csv(&path, Some("x"));
        assert!(by_name.is_err(), "label strings are not numeric features");
        assert!(read_labeled_csv(&path, Some("missing")).is_err());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_read_labeled_csv_named_label_column() {
        let path = temp_path("labeled-first.csv");
        fs::write(&path, "digit,a,b\n7,0.5,1\n3,0.25,0\n").unwrap();

        let data = read_labeled_csv(&path, Some("digit")).unwrap();
        assert_eq!(data.features, ndarray::array![[0.5, 1.0], [0.25, 0.0]]);
        assert_eq!(data.labels, vec![1, 0]);
        assert_eq!(data.classes, vec!["3", "7"]);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_cluster_dump_format() {
        let path = temp_path("dump");
        let ids: Vec<String> = ["m1", "m2", "m3"].iter().map(|s| s.to_string()).collect();
        let metadata = HashMap::from([
            ("m1".to_string(), vec!["drama".to_string(), "1994".to_string()]),
            ("m3".to_string(), vec!["comedy".to_string()]),
        ]);
        let members = vec![vec![0, 2], vec![], vec![1]];

        write_cluster_dump(&path, &members, &ids, &metadata).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "m1\tdrama 1994\nm3\tcomedy\n\nm2\t\n\n");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_read_metadata_csv() {
        let path = temp_path("meta.csv");
        fs::write(&path, "m1,drama,1994\nm2\nm3,comedy\n").unwrap();

        let metadata = read_metadata_csv(&path).unwrap();
        assert_eq!(metadata["m1"], vec!["drama", "1994"]);
        assert!(metadata["m2"].is_empty());
        assert_eq!(metadata.len(), 3);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_write_config_csv() {
        let path = temp_path("config.csv");
        let config = ExperimentConfig {
            samples: 40,
            clusters: 2,
            shuffle: true,
            ..Default::default()
        };

        write_config_csv(&path, &config).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "samples,clusters,intra_prob,inter_prob,code_length,sample_ratio,runs,source,blob_std,shuffle\n\
             40,2,0.01,0.003,60,0.5,50,sbm,1.0,true\n"
        );
        fs::remove_file(path).unwrap();
    }
}
