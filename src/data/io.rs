//! ROOT input, HDF5 output, and path resolution for both.

use super::*;
use hdf5::H5Type;
use indexmap::IndexMap;
use ndarray::ArrayView1;
use oxyroot::{Branch, ReaderTree, RootFile, Slice};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Branch holding the per-event region energy deposits.
pub const DEPOSITS_BRANCH: &str = "jetRegionEt";
/// Branch holding the per-event signal labels.
pub const LABELS_BRANCH: &str = "allL1Signals";
/// Branch holding the reference jet transverse momentum.
pub const RECO_PT_BRANCH: &str = "recoPt_1";
/// Branch holding the reference jet pseudorapidity.
pub const RECO_ETA_BRANCH: &str = "recoEta_1";
/// Branch holding the reference jet azimuth.
pub const RECO_PHI_BRANCH: &str = "recoPhi_1";
/// Branch holding the Level-1 transverse momentum.
pub const L1_PT_BRANCH: &str = "l1Pt_1";
/// Branch holding the per-event `TLorentzVector` trigger jets.
pub const L1_JETS_BRANCH: &str = "allL1Jets";

fn expand_path(file_path: &str) -> L1CaloResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(file_path)?))
}

/// Expand `~` and environment variables in `file_path` and check that it names an existing,
/// readable regular file.
pub fn resolve_input_file(file_path: &str) -> L1CaloResult<PathBuf> {
    let path = expand_path(file_path)?.canonicalize()?;
    if !path.is_file() {
        return Err(L1CaloError::Custom(format!(
            "'{}' is not a file",
            path.display()
        )));
    }
    File::open(&path)?;
    Ok(path)
}

/// Expand `~` and environment variables in `dir_path` and check that it names an existing
/// directory which can be listed and written to.
pub fn resolve_output_dir(dir_path: &str) -> L1CaloResult<PathBuf> {
    let path = expand_path(dir_path)?.canonicalize()?;
    let metadata = fs::metadata(&path)?;
    if !metadata.is_dir() {
        return Err(L1CaloError::Custom(format!(
            "'{}' is not a directory",
            path.display()
        )));
    }
    fs::read_dir(&path)?;
    check_writable(&path)?;
    Ok(path)
}

/// Create and remove a marker file, since permission bits alone do not say whether the current
/// user may write into `dir`.
fn check_writable(dir: &Path) -> L1CaloResult<()> {
    let marker = dir.join(format!(".l1calo_h5_write_check_{}", std::process::id()));
    File::create(&marker).map_err(|err| {
        L1CaloError::Custom(format!("'{}' is not writable: {err}", dir.display()))
    })?;
    fs::remove_file(&marker)?;
    Ok(())
}

/// The shape of a ROOT branch: how many `std::vector` layers wrap a numeric leaf type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BranchType {
    /// `0` for one value per event, `1` for `vector<T>`, `2` for `vector<vector<T>>`
    pub depth: usize,
    /// The leaf type
    pub kind: ElementKind,
}

impl BranchType {
    /// Parse a ROOT item type name such as `float`, `std::vector<int>` or
    /// `vector<vector<bool> >`.
    pub fn parse(type_name: &str) -> Option<Self> {
        let name = type_name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase()
            .replace("std::", "");
        let mut depth = 0;
        let mut rest = name.as_str();
        while let Some(inner) = rest
            .strip_prefix("vector<")
            .and_then(|inner| inner.strip_suffix('>'))
        {
            depth += 1;
            rest = inner;
        }
        ElementKind::from_type_name(rest).map(|kind| Self { depth, kind })
    }
}

type BranchLookup<'a> = IndexMap<&'a str, &'a Branch>;

/// Every branch of `tree`, nested ones included, keyed by its full dotted name.
fn branch_lookup(tree: &ReaderTree) -> BranchLookup<'_> {
    tree.branches_r()
        .into_iter()
        .map(|branch| (branch.name(), branch))
        .collect()
}

/// Expands `$body` once per [`ElementKind`], with `$ty` bound to the matching Rust type.
macro_rules! with_element_type {
    ($kind:expr, $ty:ident => $body:expr) => {
        match $kind {
            ElementKind::Bool => {
                type $ty = bool;
                $body
            }
            ElementKind::I16 => {
                type $ty = i16;
                $body
            }
            ElementKind::U16 => {
                type $ty = u16;
                $body
            }
            ElementKind::I32 => {
                type $ty = i32;
                $body
            }
            ElementKind::U32 => {
                type $ty = u32;
                $body
            }
            ElementKind::I64 => {
                type $ty = i64;
                $body
            }
            ElementKind::F32 => {
                type $ty = f32;
                $body
            }
            ElementKind::F64 => {
                type $ty = f64;
                $body
            }
        }
    };
}

fn map_root_error<E: std::fmt::Display>(context: &str, err: E) -> L1CaloError {
    L1CaloError::Custom(format!("{context}: {err}"))
}

fn read_error<E: std::fmt::Display>(column_name: &str, err: E) -> L1CaloError {
    map_root_error(&format!("Failed to read branch '{column_name}'"), err)
}

fn find_branch<'a>(lookup: &BranchLookup<'a>, column_name: &str) -> L1CaloResult<&'a Branch> {
    lookup
        .get(column_name)
        .copied()
        .ok_or_else(|| L1CaloError::MissingColumn {
            name: column_name.to_string(),
        })
}

fn branch_type(branch: &Branch, column_name: &str) -> L1CaloResult<BranchType> {
    let type_name = branch.item_type_name();
    BranchType::parse(&type_name).ok_or_else(|| L1CaloError::UnsupportedBranchType {
        name: column_name.to_string(),
        type_name: type_name.to_string(),
    })
}

fn unsupported(branch: &Branch, column_name: &str) -> L1CaloError {
    L1CaloError::UnsupportedBranchType {
        name: column_name.to_string(),
        type_name: branch.item_type_name().to_string(),
    }
}

/// Read a branch with exactly one value per event.
fn read_scalar_column(lookup: &BranchLookup<'_>, column_name: &str) -> L1CaloResult<FlatColumn> {
    let branch = find_branch(lookup, column_name)?;
    let branch_type = branch_type(branch, column_name)?;
    if branch_type.depth != 0 {
        return Err(unsupported(branch, column_name));
    }
    let column = with_element_type!(branch_type.kind, T => FlatColumn::from(
        branch
            .as_iter::<T>()
            .map_err(|err| read_error(column_name, err))?
            .collect::<Vec<T>>()
    ));
    debug!(column = column_name, kind = %column.kind(), len = column.len(), "read scalar column");
    Ok(column)
}

/// Read a `vector<T>` branch.
fn read_jagged_column(lookup: &BranchLookup<'_>, column_name: &str) -> L1CaloResult<JaggedColumn> {
    let branch = find_branch(lookup, column_name)?;
    let branch_type = branch_type(branch, column_name)?;
    if branch_type.depth != 1 {
        return Err(unsupported(branch, column_name));
    }
    let column = with_element_type!(branch_type.kind, T => JaggedColumn::from(
        branch
            .as_iter::<Vec<T>>()
            .map_err(|err| read_error(column_name, err))?
            .collect::<Jagged<T>>()
    ));
    debug!(column = column_name, kind = %column.kind(), events = column.n_rows(), "read jagged column");
    Ok(column)
}

/// Read a branch of any supported depth as one row per event.
///
/// Scalars become one-element rows and `vector<vector<T>>` rows are concatenated, so that
/// flattening the result removes all structure.
fn read_nested_column(lookup: &BranchLookup<'_>, column_name: &str) -> L1CaloResult<JaggedColumn> {
    let branch = find_branch(lookup, column_name)?;
    let branch_type = branch_type(branch, column_name)?;
    let column = match branch_type.depth {
        0 => with_element_type!(branch_type.kind, T => JaggedColumn::from(
            branch
                .as_iter::<T>()
                .map_err(|err| read_error(column_name, err))?
                .map(|value| vec![value])
                .collect::<Jagged<T>>()
        )),
        1 => return read_jagged_column(lookup, column_name),
        2 => with_element_type!(branch_type.kind, T => JaggedColumn::from(
            branch
                .as_iter::<Vec<Vec<T>>>()
                .map_err(|err| read_error(column_name, err))?
                .map(|rows| rows.into_iter().flatten().collect::<Vec<T>>())
                .collect::<Jagged<T>>()
        )),
        _ => return Err(unsupported(branch, column_name)),
    };
    debug!(column = column_name, kind = %column.kind(), events = column.n_rows(), "read nested column");
    Ok(column)
}

/// Sub-branch names under which a split `vector<TLorentzVector>` stores its members, as
/// `(primary, alternative)` suffixes of the parent branch name.
const JET_COMPONENTS: [(&str, &str); 4] = [
    ("fP.fX", "fX"),
    ("fP.fY", "fY"),
    ("fP.fZ", "fZ"),
    ("fE", "fE"),
];

fn find_jet_component<'a>(
    lookup: &BranchLookup<'a>,
    column_name: &str,
    (primary, alternative): (&str, &str),
) -> Result<&'a Branch, String> {
    let primary = format!("{column_name}.{primary}");
    lookup
        .get(primary.as_str())
        .or_else(|| lookup.get(format!("{column_name}.{alternative}").as_str()))
        .copied()
        .ok_or(primary)
}

/// Read one split member as a list of `f64` per event.
fn read_f64_rows(branch: &Branch) -> L1CaloResult<Vec<Vec<f64>>> {
    match branch.as_iter::<Vec<f64>>() {
        Ok(rows) => Ok(rows.collect()),
        Err(_) => Ok(branch
            .as_iter::<Slice<f64>>()
            .map_err(|err| read_error(branch.name(), err))?
            .map(Slice::into_vec)
            .collect()),
    }
}

/// Read the per-event trigger jets from the split members of a `vector<TLorentzVector>` branch.
///
/// The four members must hold the same number of events and, within each event, the same number
/// of jets. A jet branch which is present but not split is rejected.
fn read_jets(lookup: &BranchLookup<'_>, column_name: &str) -> L1CaloResult<Jagged<L1Jet>> {
    let mut components = Vec::with_capacity(JET_COMPONENTS.len());
    for names in JET_COMPONENTS {
        match find_jet_component(lookup, column_name, names) {
            Ok(branch) => components.push(branch),
            Err(missing) => {
                return Err(match lookup.get(column_name) {
                    Some(parent) if components.is_empty() => unsupported(parent, column_name),
                    _ if components.is_empty() => L1CaloError::MissingColumn {
                        name: column_name.to_string(),
                    },
                    _ => L1CaloError::MissingColumn { name: missing },
                })
            }
        }
    }
    let [fx, fy, fz, fe] = [
        read_f64_rows(components[0])?,
        read_f64_rows(components[1])?,
        read_f64_rows(components[2])?,
        read_f64_rows(components[3])?,
    ];
    for (branch, rows) in components[1..].iter().zip([&fy, &fz, &fe]) {
        if rows.len() != fx.len() {
            return Err(L1CaloError::LengthMismatch {
                context: format!("Events in '{}'", branch.name()),
                expected: fx.len(),
                actual: rows.len(),
            });
        }
    }

    let mut jets = Jagged::default();
    for (event, (((x, y), z), e)) in fx.iter().zip(&fy).zip(&fz).zip(&fe).enumerate() {
        for (branch, row) in components[1..].iter().zip([y, z, e]) {
            if row.len() != x.len() {
                return Err(L1CaloError::LengthMismatch {
                    context: format!("Jets in event {event} of '{}'", branch.name()),
                    expected: x.len(),
                    actual: row.len(),
                });
            }
        }
        jets.push_row(
            x.iter()
                .zip(y)
                .zip(z)
                .zip(e)
                .map(|(((&px, &py), &pz), &energy)| L1Jet::new(px, py, pz, energy)),
        );
    }
    debug!(column = column_name, events = jets.n_rows(), jets = jets.len(), "read trigger jets");
    Ok(jets)
}

/// Read every column the conversion needs from the TTree `tree_name` of a ROOT file.
///
/// Columns are read in a fixed order (deposits, labels, reference jet, Level-1 `pt`, trigger
/// jets) and the first missing or malformed one aborts the read.
///
/// # Errors
///
/// Fails if the file cannot be opened as ROOT, the tree does not exist
/// ([`L1CaloError::MissingTree`]), a branch is absent ([`L1CaloError::MissingColumn`]), a branch
/// has the wrong shape or leaf type ([`L1CaloError::UnsupportedBranchType`]), or decoding a
/// branch fails.
pub fn read_root(file_path: &Path, tree_name: &str) -> L1CaloResult<RawColumns> {
    let mut file = RootFile::open(file_path).map_err(|err| {
        L1CaloError::Custom(format!(
            "Failed to open ROOT file '{}': {err}",
            file_path.display()
        ))
    })?;
    let tree = file
        .get_tree(tree_name)
        .map_err(|err| L1CaloError::MissingTree {
            name: tree_name.to_string(),
            reason: err.to_string(),
        })?;
    let lookup = branch_lookup(&tree);
    debug!(tree = tree_name, branches = lookup.len(), "opened tree");

    Ok(RawColumns {
        deposits: read_jagged_column(&lookup, DEPOSITS_BRANCH)?,
        labels: read_nested_column(&lookup, LABELS_BRANCH)?,
        reco_pt: read_scalar_column(&lookup, RECO_PT_BRANCH)?,
        reco_eta: read_scalar_column(&lookup, RECO_ETA_BRANCH)?,
        reco_phi: read_scalar_column(&lookup, RECO_PHI_BRANCH)?,
        l1_pt: read_scalar_column(&lookup, L1_PT_BRANCH)?,
        l1_jets: read_jets(&lookup, L1_JETS_BRANCH)?,
    })
}

fn write_values<T: H5Type>(file: &hdf5::File, name: &str, values: &[T]) -> L1CaloResult<()> {
    let dataset = file.new_dataset::<T>().shape(values.len()).create(name)?;
    dataset.write(ArrayView1::from(values))?;
    debug!(dataset = name, len = values.len(), "wrote dataset");
    Ok(())
}

fn write_column(file: &hdf5::File, name: &str, column: &FlatColumn) -> L1CaloResult<()> {
    match column {
        FlatColumn::Bool(values) => write_values(file, name, values),
        FlatColumn::I16(values) => write_values(file, name, values),
        FlatColumn::U16(values) => write_values(file, name, values),
        FlatColumn::I32(values) => write_values(file, name, values),
        FlatColumn::U32(values) => write_values(file, name, values),
        FlatColumn::I64(values) => write_values(file, name, values),
        FlatColumn::F32(values) => write_values(file, name, values),
        FlatColumn::F64(values) => write_values(file, name, values),
    }
}

/// Write the ten arrays of a [`Dataset`] into a new HDF5 file at `file_path`.
///
/// An existing file at that path is truncated. The file handle is released on every exit path,
/// but a failure part-way through leaves the datasets written so far on disk.
pub fn write_hdf5(dataset: &Dataset, file_path: &Path) -> L1CaloResult<()> {
    let file = hdf5::File::create(file_path)?;
    write_column(&file, "deposits", &dataset.deposits)?;
    write_column(&file, "labels", &dataset.labels)?;
    write_column(&file, "reco_eta", &dataset.reco_eta)?;
    write_column(&file, "reco_phi", &dataset.reco_phi)?;
    write_column(&file, "reco_pt", &dataset.reco_pt)?;
    write_column(&file, "l1_pt", &dataset.l1_pt)?;
    write_values(&file, "l1_jets", &dataset.l1_jets)?;
    write_values(&file, "l1_jets_deltas", &dataset.l1_jets_deltas)?;
    write_values(&file, "l1_jets_pts", &dataset.l1_jets_pts)?;
    write_values(&file, "jets_per_event", &dataset.jets_per_event)?;
    file.close()?;
    Ok(())
}

#[cfg(test)]
pub(crate) const DATASET_NAMES: [&str; 10] = [
    "deposits",
    "labels",
    "reco_eta",
    "reco_phi",
    "reco_pt",
    "l1_pt",
    "l1_jets",
    "l1_jets_deltas",
    "l1_jets_pts",
    "jets_per_event",
];

#[cfg(test)]
pub(crate) fn read_back<T: H5Type>(path: &Path, name: &str) -> Vec<T> {
    hdf5::File::open(path)
        .expect("output should open")
        .dataset(name)
        .unwrap_or_else(|_| panic!("dataset '{name}' should exist"))
        .read_raw::<T>()
        .unwrap_or_else(|_| panic!("dataset '{name}' should be readable"))
}

#[cfg(test)]
pub(crate) fn make_temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("l1calo_h5_test_{}", fastrand::u64(..)));
    fs::create_dir(&dir).expect("temp dir should be created");
    dir
}

#[cfg(test)]
pub(crate) fn write_tree<T>(path: &Path, tree_name: &str, columns: &[(&str, Vec<T>)])
where
    T: oxyroot::Marshaler + Clone + 'static,
{
    use oxyroot::WriterTree;

    let mut file = RootFile::create(path).expect("ROOT file should be created");
    let mut tree = WriterTree::new(tree_name);
    for (name, values) in columns {
        tree.new_branch(name.to_string(), values.clone().into_iter());
    }
    tree.write(&mut file).expect("tree should be written");
    file.close().expect("ROOT file should close");
}

/// One event of a synthetic ntuple.
#[cfg(test)]
#[derive(Clone, Debug)]
pub(crate) struct TestEvent {
    pub deposits: Vec<f32>,
    pub labels: Vec<bool>,
    pub reco_pt: f32,
    pub reco_eta: f32,
    pub reco_phi: f32,
    pub l1_pt: f32,
    pub jets: Vec<L1Jet>,
}

/// Three events, the middle one without trigger jets.
#[cfg(test)]
pub(crate) fn test_events() -> Vec<TestEvent> {
    vec![
        TestEvent {
            deposits: vec![1.0, 2.5, 0.0],
            labels: vec![true, false],
            reco_pt: 40.0,
            reco_eta: 0.5,
            reco_phi: 1.0,
            l1_pt: 38.0,
            jets: vec![
                L1Jet::new(3.0, 4.0, 0.0, 30.0),
                L1Jet::new(-1.0, 0.0, 2.0, 5.0),
            ],
        },
        TestEvent {
            deposits: vec![],
            labels: vec![false],
            reco_pt: 55.5,
            reco_eta: -1.25,
            reco_phi: -2.0,
            l1_pt: 0.0,
            jets: vec![],
        },
        TestEvent {
            deposits: vec![7.25, 0.5],
            labels: vec![],
            reco_pt: 120.0,
            reco_eta: 2.0,
            reco_phi: 3.0,
            l1_pt: 110.0,
            jets: vec![L1Jet::new(0.0, -3.0, 1.0, 12.0)],
        },
    ]
}

/// Write `events` as an ntuple with split trigger jets into the TTree `tree_name`.
#[cfg(test)]
pub(crate) fn write_ntuple(path: &Path, tree_name: &str, events: &[TestEvent]) {
    use oxyroot::WriterTree;

    fn column<T: Clone + 'static>(
        events: &[TestEvent],
        f: impl Fn(&TestEvent) -> T,
    ) -> std::vec::IntoIter<T> {
        events.iter().map(f).collect::<Vec<T>>().into_iter()
    }
    fn jet_column(
        events: &[TestEvent],
        f: impl Fn(&L1Jet) -> f64 + Copy,
    ) -> std::vec::IntoIter<Vec<f64>> {
        column(events, |event| event.jets.iter().map(f).collect::<Vec<f64>>())
    }

    let mut file = RootFile::create(path).expect("ROOT file should be created");
    let mut tree = WriterTree::new(tree_name);
    tree.new_branch(DEPOSITS_BRANCH, column(events, |e| e.deposits.clone()));
    tree.new_branch(LABELS_BRANCH, column(events, |e| e.labels.clone()));
    tree.new_branch(RECO_PT_BRANCH, column(events, |e| e.reco_pt));
    tree.new_branch(RECO_ETA_BRANCH, column(events, |e| e.reco_eta));
    tree.new_branch(RECO_PHI_BRANCH, column(events, |e| e.reco_phi));
    tree.new_branch(L1_PT_BRANCH, column(events, |e| e.l1_pt));
    tree.new_branch(
        format!("{L1_JETS_BRANCH}.fP.fX"),
        jet_column(events, |jet| jet.fx),
    );
    tree.new_branch(
        format!("{L1_JETS_BRANCH}.fP.fY"),
        jet_column(events, |jet| jet.fy),
    );
    tree.new_branch(
        format!("{L1_JETS_BRANCH}.fP.fZ"),
        jet_column(events, |jet| jet.fz),
    );
    tree.new_branch(format!("{L1_JETS_BRANCH}.fE"), jet_column(events, |jet| jet.fe));
    tree.write(&mut file).expect("tree should be written");
    file.close().expect("ROOT file should close");
}
