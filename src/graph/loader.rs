//! Dataset loading and train/val/test partitioning.
//!
//! Two layouts are understood:
//! - `elliptic`: the Elliptic Bitcoin transaction dataset under `raw/`,
//!   split by time step.
//! - `test`: a small synthetic `nodes.csv` / `edges.csv` pair, split
//!   positionally 60/20/20.

use crate::core::{Error, NodeId, Result};
use crate::gnn::Matrix;
use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

const ELLIPTIC_FEATURES: &str = "elliptic_txs_features.csv";
const ELLIPTIC_CLASSES: &str = "elliptic_txs_classes.csv";
const ELLIPTIC_EDGES: &str = "elliptic_txs_edgelist.csv";

/// Supported datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetName {
    Elliptic,
    Test,
}

impl Default for DatasetName {
    fn default() -> Self {
        Self::Test
    }
}

impl std::str::FromStr for DatasetName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "elliptic" => Ok(Self::Elliptic),
            "test" => Ok(Self::Test),
            other => Err(Error::UnknownDataset(other.to_string())),
        }
    }
}

impl std::fmt::Display for DatasetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetName::Elliptic => write!(f, "elliptic"),
            DatasetName::Test => write!(f, "test"),
        }
    }
}

/// Time-step cutoffs for the temporal split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitParams {
    /// First time step that is no longer training data
    pub train_split_step: i64,
    /// First time step that is test data
    pub val_split_step: i64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            train_split_step: 35,
            val_split_step: 42,
        }
    }
}

/// Pairwise disjoint train/val/test node masks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Masks {
    train: Vec<bool>,
    val: Vec<bool>,
    test: Vec<bool>,
}

impl Masks {
    /// Validate equal lengths and disjointness.
    pub fn new(train: Vec<bool>, val: Vec<bool>, test: Vec<bool>) -> Result<Self> {
        for (context, mask) in [("val mask length", &val), ("test mask length", &test)] {
            if mask.len() != train.len() {
                return Err(Error::ShapeMismatch {
                    context,
                    expected: train.len(),
                    actual: mask.len(),
                });
            }
        }
        if let Some(node) = (0..train.len())
            .find(|&i| [train[i], val[i], test[i]].iter().filter(|&&m| m).count() > 1)
        {
            return Err(Error::DataFormat(format!(
                "node {node} is assigned to more than one split"
            )));
        }
        Ok(Self { train, val, test })
    }

    pub fn train(&self) -> &[bool] {
        &self.train
    }

    pub fn val(&self) -> &[bool] {
        &self.val
    }

    pub fn test(&self) -> &[bool] {
        &self.test
    }

    pub fn len(&self) -> usize {
        self.train.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }

    /// Number of selected nodes in (train, val, test).
    pub fn counts(&self) -> (usize, usize, usize) {
        let count = |m: &[bool]| m.iter().filter(|&&x| x).count();
        (count(&self.train), count(&self.val), count(&self.test))
    }
}

/// Partition nodes by timestamp: `< train_split_step` train,
/// `[train_split_step, val_split_step)` val, the rest test.
pub fn temporal_split(timestamps: &[i64], split: SplitParams) -> Result<Masks> {
    if split.train_split_step > split.val_split_step {
        return Err(Error::InvalidConfig(format!(
            "train_split_step {} is after val_split_step {}",
            split.train_split_step, split.val_split_step
        )));
    }
    let train = timestamps
        .iter()
        .map(|&t| t < split.train_split_step)
        .collect();
    let val = timestamps
        .iter()
        .map(|&t| t >= split.train_split_step && t < split.val_split_step)
        .collect();
    let test = timestamps
        .iter()
        .map(|&t| t >= split.val_split_step)
        .collect();
    Masks::new(train, val, test)
}

/// First 60% train, next 20% val, remainder test.
pub fn positional_split(num_nodes: usize) -> Masks {
    let train_end = num_nodes * 6 / 10;
    let val_end = num_nodes * 8 / 10;
    Masks {
        train: (0..num_nodes).map(|i| i < train_end).collect(),
        val: (0..num_nodes).map(|i| i >= train_end && i < val_end).collect(),
        test: (0..num_nodes).map(|i| i >= val_end).collect(),
    }
}

/// Everything the trainer needs from the graph store.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub graph: Graph,
    pub features: Matrix,
    pub labels: Vec<u32>,
    pub masks: Masks,
    /// Edges dropped because an endpoint was not a known node
    pub dropped_edges: usize,
}

impl Dataset {
    /// Assemble a dataset, checking that every per-node array matches the node count.
    pub fn new(graph: Graph, features: Matrix, labels: Vec<u32>, masks: Masks) -> Result<Self> {
        let n = graph.num_nodes();
        for (context, len) in [
            ("feature rows vs node count", features.rows()),
            ("labels vs node count", labels.len()),
            ("masks vs node count", masks.len()),
        ] {
            if len != n {
                return Err(Error::ShapeMismatch {
                    context,
                    expected: n,
                    actual: len,
                });
            }
        }
        Ok(Self {
            graph,
            features,
            labels,
            masks,
            dropped_edges: 0,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }

    pub fn num_features(&self) -> usize {
        self.features.cols()
    }
}

/// Load a dataset by name from `data_path`.
pub fn load(data_path: &Path, dataset: DatasetName, split: SplitParams) -> Result<Dataset> {
    info!(path = %data_path.display(), %dataset, "loading dataset");
    let data = match dataset {
        DatasetName::Elliptic => load_elliptic(data_path, split)?,
        DatasetName::Test => load_test(data_path)?,
    };
    let (train, val, test) = data.masks.counts();
    info!(
        nodes = data.num_nodes(),
        edges = data.graph.num_edges(),
        features = data.num_features(),
        train,
        val,
        test,
        "dataset loaded"
    );
    Ok(data)
}

fn open_csv(path: &Path, has_headers: bool) -> Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        Error::DataFormat(format!("{} has no '{name}' column", path.display()))
    })
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, path: &Path) -> Result<&'r str> {
    record.get(idx).ok_or_else(|| {
        Error::DataFormat(format!(
            "{}: row has {} fields, expected at least {}",
            path.display(),
            record.len(),
            idx + 1
        ))
    })
}

fn parse_f32(value: &str, path: &Path) -> Result<f32> {
    value
        .parse::<f32>()
        .map_err(|_| Error::DataFormat(format!("{}: '{value}' is not a number", path.display())))
}

/// Integers written either as `7` or `7.0`.
fn parse_int(value: &str, path: &Path) -> Result<i64> {
    if let Ok(v) = value.parse::<i64>() {
        return Ok(v);
    }
    match value.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 => Ok(v as i64),
        _ => Err(Error::DataFormat(format!(
            "{}: '{value}' is not an integer",
            path.display()
        ))),
    }
}

/// Keep edges whose endpoints both resolve; count the rest.
fn resolve_edges(pairs: Vec<(Option<NodeId>, Option<NodeId>)>) -> (Vec<(NodeId, NodeId)>, usize) {
    let mut edges = Vec::new();
    let mut dropped = 0;
    for pair in pairs {
        match pair {
            (Some(src), Some(dst)) => edges.push((src, dst)),
            _ => dropped += 1,
        }
    }
    (edges, dropped)
}

fn load_elliptic(data_path: &Path, split: SplitParams) -> Result<Dataset> {
    let raw = data_path.join("raw");

    // txId -> class, skipping unknowns; "1" is illicit, "2" licit.
    let classes_path = raw.join(ELLIPTIC_CLASSES);
    let mut reader = open_csv(&classes_path, true)?;
    let headers = reader.headers()?.clone();
    let id_col = column(&headers, "txId", &classes_path)?;
    let class_col = column(&headers, "class", &classes_path)?;
    let mut classes: HashMap<String, u32> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let label = match field(&record, class_col, &classes_path)? {
            "1" => 1,
            "2" => 0,
            "unknown" => continue,
            other => {
                return Err(Error::DataFormat(format!(
                    "{}: unexpected class '{other}'",
                    classes_path.display()
                )))
            }
        };
        classes.insert(field(&record, id_col, &classes_path)?.to_string(), label);
    }

    // Features: txId, time step, then the feature columns. Node ids follow file order.
    let features_path = raw.join(ELLIPTIC_FEATURES);
    let mut reader = open_csv(&features_path, false)?;
    let mut node_ids: HashMap<String, NodeId> = HashMap::new();
    let mut rows: Vec<Vec<f32>> = Vec::new();
    let mut labels = Vec::new();
    let mut timestamps = Vec::new();
    let mut width: Option<usize> = None;
    for record in reader.records() {
        let record = record?;
        let tx_id = field(&record, 0, &features_path)?;
        let Some(&label) = classes.get(tx_id) else {
            continue;
        };
        if record.len() < 3 {
            return Err(Error::DataFormat(format!(
                "{}: transaction {tx_id} has no feature columns",
                features_path.display()
            )));
        }
        let row = record
            .iter()
            .skip(2)
            .map(|v| parse_f32(v, &features_path))
            .collect::<Result<Vec<f32>>>()?;
        match width {
            Some(w) if w != row.len() => {
                return Err(Error::ShapeMismatch {
                    context: "elliptic feature row width",
                    expected: w,
                    actual: row.len(),
                })
            }
            _ => width = Some(row.len()),
        }
        if node_ids.insert(tx_id.to_string(), rows.len()).is_some() {
            return Err(Error::DataFormat(format!(
                "{}: duplicate transaction {tx_id}",
                features_path.display()
            )));
        }
        timestamps.push(parse_int(field(&record, 1, &features_path)?, &features_path)?);
        labels.push(label);
        rows.push(row);
    }
    let num_nodes = rows.len();
    let features = Matrix::from_rows(&rows, width.unwrap_or(0))?;
    debug!(num_nodes, "elliptic nodes with known class");

    let edges_path = raw.join(ELLIPTIC_EDGES);
    let mut reader = open_csv(&edges_path, true)?;
    let headers = reader.headers()?.clone();
    let src_col = column(&headers, "txId1", &edges_path)?;
    let dst_col = column(&headers, "txId2", &edges_path)?;
    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let src = node_ids.get(field(&record, src_col, &edges_path)?).copied();
        let dst = node_ids.get(field(&record, dst_col, &edges_path)?).copied();
        pairs.push((src, dst));
    }
    let (edges, dropped) = resolve_edges(pairs);
    if dropped > 0 {
        warn!(dropped, "dropped edges with endpoints outside the labelled node set");
    }

    let graph = Graph::new(num_nodes, edges)?;
    let masks = temporal_split(&timestamps, split)?;
    let mut dataset = Dataset::new(graph, features, labels, masks)?;
    dataset.dropped_edges = dropped;
    Ok(dataset)
}

fn load_test(data_path: &Path) -> Result<Dataset> {
    let nodes_path = data_path.join("nodes.csv");
    let mut reader = open_csv(&nodes_path, true)?;
    let headers = reader.headers()?.clone();
    let id_col = column(&headers, "node_id", &nodes_path)?;
    let label_col = column(&headers, "label", &nodes_path)?;
    let feature_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !matches!(*h, "node_id" | "timestamp" | "label"))
        .map(|(i, _)| i)
        .collect();

    let mut nodes: Vec<(i64, u32, Vec<f32>)> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id = parse_int(field(&record, id_col, &nodes_path)?, &nodes_path)?;
        let label = parse_int(field(&record, label_col, &nodes_path)?, &nodes_path)?;
        let label = u32::try_from(label)
            .map_err(|_| Error::DataFormat(format!("negative label {label} for node {id}")))?;
        let row = feature_cols
            .iter()
            .map(|&c| parse_f32(field(&record, c, &nodes_path)?, &nodes_path))
            .collect::<Result<Vec<f32>>>()?;
        nodes.push((id, label, row));
    }
    nodes.sort_by_key(|(id, _, _)| *id);
    if let Some((pos, (id, _, _))) = nodes
        .iter()
        .enumerate()
        .find(|(pos, (id, _, _))| *id != *pos as i64)
    {
        return Err(Error::DataFormat(format!(
            "{}: node ids must be 0..N-1, found {id} at position {pos}",
            nodes_path.display()
        )));
    }

    let num_nodes = nodes.len();
    let (labels, rows): (Vec<u32>, Vec<Vec<f32>>) =
        nodes.into_iter().map(|(_, label, row)| (label, row)).unzip();
    let features = Matrix::from_rows(&rows, feature_cols.len())?;

    let edges_path = data_path.join("edges.csv");
    let mut reader = open_csv(&edges_path, true)?;
    let headers = reader.headers()?.clone();
    let src_col = column(&headers, "src", &edges_path)?;
    let dst_col = column(&headers, "dst", &edges_path)?;
    let resolve = |v: i64| usize::try_from(v).ok().filter(|&n| n < num_nodes);
    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let src = parse_int(field(&record, src_col, &edges_path)?, &edges_path)?;
        let dst = parse_int(field(&record, dst_col, &edges_path)?, &edges_path)?;
        pairs.push((resolve(src), resolve(dst)));
    }
    let (edges, dropped) = resolve_edges(pairs);
    if dropped > 0 {
        warn!(dropped, "dropped edges referencing unknown nodes");
    }

    let graph = Graph::new(num_nodes, edges)?;
    let masks = positional_split(num_nodes);
    let mut dataset = Dataset::new(graph, features, labels, masks)?;
    dataset.dropped_edges = dropped;
    Ok(dataset)
}
