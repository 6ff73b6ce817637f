//! # l1calo-h5
//!
//! `l1calo-h5` converts a CMS Calorimeter Layer-1 Trigger ntuple (a ROOT file holding the
//! `l1NtupleProducer/efficiencyTree` TTree) into a flat HDF5 file which can be fed straight into
//! array-oriented analysis code.
//!
//! Every event in the source tree carries a jagged list of region energy deposits, a jagged list
//! of signal labels, a single reconstructed reference jet (`pt`, `eta`, `phi`), a Level-1 `pt`,
//! and a jagged list of Level-1 trigger jets stored as `TLorentzVector`s. The conversion
//!
//! 1. reads those columns with [`oxyroot`],
//! 2. flattens the jagged columns (event order, then within-event order),
//! 3. counts the trigger jets in each event,
//! 4. broadcasts each event's reference `eta`/`phi` across that event's trigger jets,
//! 5. derives `pt`, `eta` and `phi` for every trigger jet and its angular distance
//!    $`\Delta R = \sqrt{\Delta\eta^2 + \Delta\phi^2}`$ to the reference jet,
//! 6. and writes ten one-dimensional datasets into `<output_dir>/dataset.h5`.
//!
//! The output datasets are:
//!
//! | name | length | contents |
//! |---|---|---|
//! | `deposits` | total deposits | flattened `jetRegionEt` |
//! | `labels` | total labels | fully flattened `allL1Signals` |
//! | `reco_eta`, `reco_phi`, `reco_pt` | events | reference jet |
//! | `l1_pt` | events | `l1Pt_1` |
//! | `l1_jets` | total jets | compound `{fX, fY, fZ, fE}` |
//! | `l1_jets_deltas` | total jets | $`\Delta R`$ to the reference jet |
//! | `l1_jets_pts` | total jets | transverse momentum of each trigger jet |
//! | `jets_per_event` | events | trigger jet count per event |
//!
//! Note that no wraparound is applied to $`\Delta\phi`$, so a trigger jet at $`\phi\approx\pi`$
//! and a reference jet at $`\phi\approx-\pi`$ are reported as far apart.
//!
//! # Example
//! ```ignore
//! use l1calo_h5::convert::{convert, ConvertOptions};
//!
//! let written = convert("ntuple.root", "out/", &ConvertOptions::default())?;
//! println!("wrote {}", written.display());
//! ```
#![warn(clippy::perf, clippy::style)]
#![warn(missing_docs)]

use thiserror::Error;

/// End-to-end conversion of a ROOT ntuple into the flat HDF5 layout.
pub mod convert;
/// Column types and the input/output datasets.
pub mod data;
/// Geometry helpers shared by the conversion.
pub mod utils;

pub use convert::{convert, transform, ConvertOptions};
pub use data::{Dataset, ElementKind, FlatColumn, Jagged, JaggedColumn, L1Jet, RawColumns};
pub use utils::vectors::{Vec3, Vec4};

/// The error type used by all `l1calo-h5` internal methods
#[derive(Error, Debug)]
pub enum L1CaloError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`hdf5::Error`].
    #[error("HDF5 Error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// The requested TTree could not be opened.
    #[error("Failed to open ROOT tree \"{name}\": {reason}")]
    MissingTree {
        /// Path of the tree inside the ROOT file
        name: String,
        /// Message reported by the ROOT reader
        reason: String,
    },
    /// A required branch is absent from the tree.
    #[error("Missing column \"{name}\"")]
    MissingColumn {
        /// Name of the branch which failed lookup
        name: String,
    },
    /// A branch exists but stores something other than the expected shape.
    #[error("Column \"{name}\" has unsupported type \"{type_name}\"")]
    UnsupportedBranchType {
        /// Name of the branch
        name: String,
        /// Item type name reported by the ROOT reader
        type_name: String,
    },
    /// Two columns which must line up do not.
    #[error("{context}: expected length {expected}, found {actual}")]
    LengthMismatch {
        /// What was being compared
        context: String,
        /// Required length
        expected: usize,
        /// Observed length
        actual: usize,
    },
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}

/// A [`Result`] type alias for [`L1CaloError`]s.
pub type L1CaloResult<T> = Result<T, L1CaloError>;
