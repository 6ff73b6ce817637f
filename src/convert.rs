use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    data::{
        io::{read_root, write_hdf5},
        Dataset, L1Jet, RawColumns,
    },
    utils::vectors::{delta_r, Vec4},
    L1CaloResult,
};

/// The TTree read by default.
pub const DEFAULT_TREE: &str = "l1NtupleProducer/efficiencyTree";
/// The file name written inside the output directory by default.
pub const DEFAULT_OUTPUT_NAME: &str = "dataset.h5";

/// Options which control where [`convert`] reads from and writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Path of the TTree inside the ROOT file
    pub tree: String,
    /// Name of the HDF5 file created inside the output directory
    pub output_name: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            tree: DEFAULT_TREE.to_string(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
        }
    }
}

impl ConvertOptions {
    /// The default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from a different TTree.
    pub fn tree<S: Into<String>>(mut self, tree: S) -> Self {
        self.tree = tree.into();
        self
    }

    /// Write to a different file name inside the output directory.
    pub fn output_name<S: Into<String>>(mut self, output_name: S) -> Self {
        self.output_name = output_name.into();
        self
    }
}

/// Reshape the raw ntuple columns into the ten flat output arrays.
///
/// Deposits lose their event grouping, labels lose all grouping, and each event's reference
/// `eta`/`phi` is broadcast across its trigger jets so that every jet gets
/// $`\Delta R`$ to the reference jet of its own event. `jets_per_event` is the only output which
/// still records the event boundaries.
///
/// # Errors
///
/// Returns [`L1CaloError::LengthMismatch`](crate::L1CaloError::LengthMismatch) if the reference
/// jet columns do not have one entry per event of the trigger-jet column.
pub fn transform(raw: RawColumns) -> L1CaloResult<Dataset> {
    let RawColumns {
        deposits,
        labels,
        reco_pt,
        reco_eta,
        reco_phi,
        l1_pt,
        l1_jets,
    } = raw;

    let deposits = deposits.flatten();
    let labels = labels.flatten();
    let jets_per_event: Vec<i64> = l1_jets.counts().into_iter().map(|n| n as i64).collect();

    let jet_eta = l1_jets.broadcast(&reco_eta.to_f64())?.flatten();
    let jet_phi = l1_jets.broadcast(&reco_phi.to_f64())?.flatten();
    let l1_jets = l1_jets.flatten();

    let p4s: Vec<Vec4> = l1_jets.iter().map(L1Jet::p4).collect();
    let l1_jets_deltas: Vec<f64> = p4s
        .iter()
        .zip(jet_eta.iter().zip(&jet_phi))
        .map(|(p4, (&eta, &phi))| delta_r(p4.eta(), p4.phi(), eta, phi))
        .collect();
    let l1_jets_pts: Vec<f64> = p4s.iter().map(Vec4::pt).collect();
    debug!(
        deposits = deposits.len(),
        labels = labels.len(),
        jets = l1_jets.len(),
        "flattened columns"
    );

    Ok(Dataset {
        deposits,
        labels,
        reco_eta,
        reco_phi,
        reco_pt,
        l1_pt,
        l1_jets,
        l1_jets_deltas,
        l1_jets_pts,
        jets_per_event,
    })
}

/// Convert the ntuple at `source` into an HDF5 file inside `target_dir`, returning the path of
/// the written file.
///
/// Every input column is read and transformed before the output file is created, so a missing
/// tree or branch never leaves a file behind. The output file is created or truncated without
/// checking what was there before.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    target_dir: Q,
    options: &ConvertOptions,
) -> L1CaloResult<PathBuf> {
    let source = source.as_ref();
    info!(source = %source.display(), tree = %options.tree, "reading ntuple");
    let raw = read_root(source, &options.tree)?;
    info!(events = raw.n_events(), "read columns");

    let dataset = transform(raw)?;
    info!(
        events = dataset.n_events(),
        jets = dataset.n_jets(),
        "derived trigger jet kinematics"
    );

    let output = target_dir.as_ref().join(&options.output_name);
    write_hdf5(&dataset, &output)?;
    info!(output = %output.display(), "wrote dataset");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{
            io::{
                make_temp_dir, read_back, test_events, write_ntuple, write_tree, DATASET_NAMES,
                DEPOSITS_BRANCH,
            },
            FlatColumn, Jagged, JaggedColumn,
        },
        L1CaloError,
    };
    use approx::assert_relative_eq;
    use std::fs;

    fn jet(pt: f64, eta: f64, phi: f64, fe: f64) -> L1Jet {
        L1Jet::new(pt * phi.cos(), pt * phi.sin(), pt * eta.sinh(), fe)
    }

    fn test_raw_columns() -> RawColumns {
        RawColumns {
            deposits: JaggedColumn::from(
                vec![vec![1.0f32, 2.0, 3.0], vec![], vec![4.0, 5.0]]
                    .into_iter()
                    .collect::<Jagged<f32>>(),
            ),
            labels: JaggedColumn::from(
                vec![vec![true], vec![false, true], vec![]]
                    .into_iter()
                    .collect::<Jagged<bool>>(),
            ),
            reco_pt: FlatColumn::F32(vec![50.0, 60.0, 70.0]),
            reco_eta: FlatColumn::F32(vec![0.0, 1.0, -0.5]),
            reco_phi: FlatColumn::F32(vec![0.0, -1.0, 2.0]),
            l1_pt: FlatColumn::F32(vec![45.0, 58.0, 0.0]),
            l1_jets: vec![
                vec![
                    jet(30.0, 0.3, 0.4, 31.0),
                    jet(10.0, 0.0, 0.0, 11.0),
                    jet(5.0, -0.3, -0.4, 6.0),
                ],
                vec![],
                vec![jet(20.0, -0.5, 2.0, 25.0), jet(8.0, 0.5, 2.0, 9.0)],
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn test_transform_lengths() {
        let dataset = transform(test_raw_columns()).unwrap();
        assert_eq!(dataset.n_events(), 3);
        assert_eq!(dataset.n_jets(), 5);
        assert_eq!(dataset.l1_jets_deltas.len(), dataset.n_jets());
        assert_eq!(dataset.l1_jets_pts.len(), dataset.n_jets());
        assert_eq!(
            dataset.jets_per_event.iter().sum::<i64>() as usize,
            dataset.l1_jets.len()
        );
        for column in [
            &dataset.reco_eta,
            &dataset.reco_phi,
            &dataset.reco_pt,
            &dataset.l1_pt,
        ] {
            assert_eq!(column.len(), dataset.n_events());
        }
    }

    #[test]
    fn test_transform_flattens_in_event_order() {
        let dataset = transform(test_raw_columns()).unwrap();
        assert_eq!(
            dataset.deposits,
            FlatColumn::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0])
        );
        assert_eq!(dataset.labels, FlatColumn::Bool(vec![true, false, true]));
        assert_eq!(dataset.jets_per_event, vec![3, 0, 2]);
        assert_eq!(dataset.l1_jets[0], jet(30.0, 0.3, 0.4, 31.0));
        assert_eq!(dataset.l1_jets[4], jet(8.0, 0.5, 2.0, 9.0));
        assert_eq!(dataset.reco_eta, FlatColumn::F32(vec![0.0, 1.0, -0.5]));
    }

    #[test]
    fn test_transform_deltas_use_own_event() {
        let dataset = transform(test_raw_columns()).unwrap();
        // event 0, reference at (0, 0)
        assert_relative_eq!(dataset.l1_jets_deltas[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(dataset.l1_jets_deltas[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(dataset.l1_jets_deltas[2], 0.5, epsilon = 1e-12);
        // event 2, reference at (-0.5, 2.0)
        assert_relative_eq!(dataset.l1_jets_deltas[3], 0.0, epsilon = 1e-6);
        assert_relative_eq!(dataset.l1_jets_deltas[4], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_transform_pts_ignore_energy_member() {
        let dataset = transform(test_raw_columns()).unwrap();
        let expected = [30.0, 10.0, 5.0, 20.0, 8.0];
        for (pt, expected) in dataset.l1_jets_pts.iter().zip(expected) {
            assert_relative_eq!(*pt, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_delta_is_independent_of_pt() {
        for pt in [0.5, 17.0, 250.0] {
            let raw = RawColumns {
                deposits: JaggedColumn::from(vec![vec![0.0f32]].into_iter().collect::<Jagged<_>>()),
                labels: JaggedColumn::from(vec![vec![true]].into_iter().collect::<Jagged<_>>()),
                reco_pt: FlatColumn::F64(vec![100.0]),
                reco_eta: FlatColumn::F64(vec![0.0]),
                reco_phi: FlatColumn::F64(vec![-1.0]),
                l1_pt: FlatColumn::F64(vec![90.0]),
                l1_jets: vec![vec![jet(pt, 3.0, 3.0, 2.0 * pt)]].into_iter().collect(),
            };
            let dataset = transform(raw).unwrap();
            assert_relative_eq!(dataset.l1_jets_deltas[0], 5.0, epsilon = 1e-9);
            assert_relative_eq!(dataset.l1_jets_pts[0], pt, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_transform_zero_jet_events() {
        let raw = RawColumns {
            deposits: JaggedColumn::from(vec![vec![], vec![2u16]].into_iter().collect::<Jagged<_>>()),
            labels: JaggedColumn::from(vec![vec![0i32], vec![1]].into_iter().collect::<Jagged<_>>()),
            reco_pt: FlatColumn::F32(vec![10.0, 20.0]),
            reco_eta: FlatColumn::F32(vec![0.0, 0.0]),
            reco_phi: FlatColumn::F32(vec![0.0, 0.0]),
            l1_pt: FlatColumn::F32(vec![0.0, 0.0]),
            l1_jets: vec![vec![], vec![]].into_iter().collect(),
        };
        let dataset = transform(raw).unwrap();
        assert_eq!(dataset.jets_per_event, vec![0, 0]);
        assert!(dataset.l1_jets.is_empty());
        assert!(dataset.l1_jets_deltas.is_empty());
        assert!(dataset.l1_jets_pts.is_empty());
        assert_eq!(dataset.deposits, FlatColumn::U16(vec![2]));
        assert_eq!(dataset.labels, FlatColumn::I32(vec![0, 1]));
    }

    #[test]
    fn test_transform_no_phi_wraparound() {
        let raw = RawColumns {
            deposits: JaggedColumn::from(vec![vec![0.0f32]].into_iter().collect::<Jagged<_>>()),
            labels: JaggedColumn::from(vec![vec![false]].into_iter().collect::<Jagged<_>>()),
            reco_pt: FlatColumn::F64(vec![10.0]),
            reco_eta: FlatColumn::F64(vec![0.0]),
            reco_phi: FlatColumn::F64(vec![-3.1]),
            l1_pt: FlatColumn::F64(vec![10.0]),
            l1_jets: vec![vec![jet(10.0, 0.0, 3.1, 10.0)]].into_iter().collect(),
        };
        let dataset = transform(raw).unwrap();
        assert_relative_eq!(dataset.l1_jets_deltas[0], 6.2, epsilon = 1e-9);
    }

    #[test]
    fn test_transform_shape_mismatch() {
        let mut raw = test_raw_columns();
        raw.reco_eta = FlatColumn::F32(vec![0.0, 1.0]);
        assert!(matches!(
            transform(raw),
            Err(L1CaloError::LengthMismatch {
                expected: 3,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let first = transform(test_raw_columns()).unwrap();
        let second = transform(test_raw_columns()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_options_builder() {
        let options = ConvertOptions::new();
        assert_eq!(options.tree, "l1NtupleProducer/efficiencyTree");
        assert_eq!(options.output_name, "dataset.h5");
        let options = ConvertOptions::new().tree("events").output_name("out.h5");
        assert_eq!(options.tree, "events");
        assert_eq!(options.output_name, "out.h5");
    }

    #[test]
    fn test_convert_missing_column_leaves_no_output() {
        let dir = make_temp_dir();
        let source = dir.join("ntuple.root");
        write_tree(
            &source,
            "efficiencyTree",
            &[
                ("recoPt_1", vec![40.0f32]),
                ("recoEta_1", vec![0.1]),
                ("recoPhi_1", vec![1.0]),
                ("l1Pt_1", vec![35.0]),
            ],
        );
        let options = ConvertOptions::new().tree("efficiencyTree");
        match convert(&source, &dir, &options) {
            Err(L1CaloError::MissingColumn { name }) => assert_eq!(name, DEPOSITS_BRANCH),
            other => panic!("expected a missing column, got {other:?}"),
        }
        assert!(!dir.join(DEFAULT_OUTPUT_NAME).exists());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_convert_missing_tree_leaves_no_output() {
        let dir = make_temp_dir();
        let source = dir.join("ntuple.root");
        write_tree(&source, "events", &[("recoPt_1", vec![40.0f32])]);
        assert!(matches!(
            convert(&source, &dir, &ConvertOptions::default()),
            Err(L1CaloError::MissingTree { .. })
        ));
        assert!(!dir.join(DEFAULT_OUTPUT_NAME).exists());
        fs::remove_dir_all(dir).ok();
    }

    fn read_output(path: &Path) -> Dataset {
        Dataset {
            deposits: FlatColumn::F32(read_back(path, "deposits")),
            labels: FlatColumn::Bool(read_back(path, "labels")),
            reco_eta: FlatColumn::F32(read_back(path, "reco_eta")),
            reco_phi: FlatColumn::F32(read_back(path, "reco_phi")),
            reco_pt: FlatColumn::F32(read_back(path, "reco_pt")),
            l1_pt: FlatColumn::F32(read_back(path, "l1_pt")),
            l1_jets: read_back(path, "l1_jets"),
            l1_jets_deltas: read_back(path, "l1_jets_deltas"),
            l1_jets_pts: read_back(path, "l1_jets_pts"),
            jets_per_event: read_back(path, "jets_per_event"),
        }
    }

    #[test]
    fn test_convert_ntuple_end_to_end() {
        let dir = make_temp_dir();
        let source = dir.join("ntuple.root");
        let events = test_events();
        write_ntuple(&source, "efficiencyTree", &events);
        let options = ConvertOptions::new().tree("efficiencyTree");

        let output = convert(&source, &dir, &options).expect("conversion should succeed");
        assert_eq!(output, dir.join(DEFAULT_OUTPUT_NAME));
        let mut names = hdf5::File::open(&output)
            .expect("output should open")
            .member_names()
            .expect("members should list");
        names.sort();
        let mut expected_names: Vec<String> = DATASET_NAMES.iter().map(|s| s.to_string()).collect();
        expected_names.sort();
        assert_eq!(names, expected_names);

        let first = read_output(&output);
        assert_eq!(first.n_events(), events.len());
        for column in [&first.reco_eta, &first.reco_phi, &first.reco_pt, &first.l1_pt] {
            assert_eq!(column.len(), events.len());
        }
        assert_eq!(first.jets_per_event, vec![2, 0, 1]);
        assert_eq!(
            first.jets_per_event.iter().sum::<i64>() as usize,
            first.l1_jets.len()
        );
        assert_eq!(first.l1_jets_deltas.len(), first.l1_jets.len());
        assert_eq!(first.l1_jets_pts.len(), first.l1_jets.len());
        assert_eq!(
            first.deposits,
            FlatColumn::F32(vec![1.0, 2.5, 0.0, 7.25, 0.5])
        );
        assert_eq!(first.labels, FlatColumn::Bool(vec![true, false, false]));
        let jets: Vec<L1Jet> = events.iter().flat_map(|e| e.jets.clone()).collect();
        assert_eq!(first.l1_jets, jets);

        assert_relative_eq!(first.l1_jets_pts[0], 5.0);
        assert_relative_eq!(first.l1_jets_pts[1], 1.0);
        assert_relative_eq!(first.l1_jets_pts[2], 3.0);
        assert_relative_eq!(
            first.l1_jets_deltas[0],
            delta_r(0.0, 4.0f64.atan2(3.0), 0.5, 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            first.l1_jets_deltas[2],
            delta_r((1.0f64 / 3.0).asinh(), -std::f64::consts::FRAC_PI_2, 2.0, 3.0),
            epsilon = 1e-12
        );

        convert(&source, &dir, &options).expect("second conversion should succeed");
        assert_eq!(read_output(&output), first);
        fs::remove_dir_all(dir).ok();
    }
}
