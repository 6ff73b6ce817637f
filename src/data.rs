use std::fmt::Display;

use crate::{utils::vectors::Vec4, L1CaloError, L1CaloResult};

/// ROOT input and HDF5 output.
pub mod io;

/// The numeric leaf types a ROOT branch may carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `bool` / `Bool_t`
    Bool,
    /// `short` / `Short_t`
    I16,
    /// `unsigned short` / `UShort_t`
    U16,
    /// `int` / `Int_t`
    I32,
    /// `unsigned int` / `UInt_t`
    U32,
    /// `long` / `Long64_t`
    I64,
    /// `float` / `Float_t`
    F32,
    /// `double` / `Double_t` / `Double32_t`
    F64,
}

impl ElementKind {
    /// Match a ROOT leaf type name (case-insensitive, whitespace-insensitive) to an
    /// [`ElementKind`].
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let name: String = type_name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match name.as_str() {
            "bool" | "bool_t" => Some(Self::Bool),
            "short" | "short_t" | "int16_t" => Some(Self::I16),
            "unsignedshort" | "ushort_t" | "uint16_t" => Some(Self::U16),
            "int" | "int_t" | "int32_t" => Some(Self::I32),
            "unsigned" | "unsignedint" | "uint_t" | "uint32_t" => Some(Self::U32),
            "long" | "longlong" | "long_t" | "long64_t" | "int64_t" => Some(Self::I64),
            "float" | "float_t" | "float32_t" => Some(Self::F32),
            "double" | "double_t" | "double32_t" => Some(Self::F64),
            _ => None,
        }
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Bool => write!(f, "bool"),
            ElementKind::I16 => write!(f, "i16"),
            ElementKind::U16 => write!(f, "u16"),
            ElementKind::I32 => write!(f, "i32"),
            ElementKind::U32 => write!(f, "u32"),
            ElementKind::I64 => write!(f, "i64"),
            ElementKind::F32 => write!(f, "f32"),
            ElementKind::F64 => write!(f, "f64"),
        }
    }
}

/// A list-of-lists stored as one contiguous buffer of values plus row offsets.
///
/// Row `i` is `values[offsets[i]..offsets[i + 1]]`. There is always one more offset than there
/// are rows, the first offset is zero and the last one equals the number of values.
#[derive(Clone, Debug, PartialEq)]
pub struct Jagged<T> {
    offsets: Vec<usize>,
    values: Vec<T>,
}

impl<T> Default for Jagged<T> {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            values: Vec::new(),
        }
    }
}

impl<T> Jagged<T> {
    /// Append a row.
    pub fn push_row<I: IntoIterator<Item = T>>(&mut self, row: I) {
        self.values.extend(row);
        self.offsets.push(self.values.len());
    }

    /// The number of rows (events).
    pub fn n_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    /// The total number of values across all rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no values (there may still be empty rows).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The number of values in each row.
    pub fn counts(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Drop the row structure, keeping values in row-then-within-row order.
    pub fn flatten(self) -> Vec<T> {
        self.values
    }

    /// Replicate one value per row across every element of that row, giving an array with the
    /// same offsets as `self`.
    ///
    /// # Errors
    ///
    /// Returns [`L1CaloError::LengthMismatch`] if `per_row.len()` differs from
    /// [`Jagged::n_rows`].
    pub fn broadcast<U: Clone>(&self, per_row: &[U]) -> L1CaloResult<Jagged<U>> {
        if per_row.len() != self.n_rows() {
            return Err(L1CaloError::LengthMismatch {
                context: "Broadcast of per-event values".to_string(),
                expected: self.n_rows(),
                actual: per_row.len(),
            });
        }
        let values = per_row
            .iter()
            .zip(self.counts())
            .flat_map(|(value, count)| std::iter::repeat(value).take(count).cloned())
            .collect();
        Ok(Jagged {
            offsets: self.offsets.clone(),
            values,
        })
    }
}

impl<T> FromIterator<Vec<T>> for Jagged<T> {
    fn from_iter<I: IntoIterator<Item = Vec<T>>>(iter: I) -> Self {
        let mut jagged = Self::default();
        for row in iter {
            jagged.push_row(row);
        }
        jagged
    }
}

trait IntoF64 {
    fn into_f64(self) -> f64;
}

macro_rules! impl_into_f64 {
    ($($ty:ty),*) => {
        $(impl IntoF64 for $ty {
            fn into_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}
impl_into_f64!(i16, u16, i32, u32, i64, f32, f64);

impl IntoF64 for bool {
    fn into_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

macro_rules! column_kinds {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// A one-dimensional column which keeps the element type it was read with.
        #[derive(Clone, Debug, PartialEq)]
        pub enum FlatColumn {
            $(
                #[doc = concat!("A column of `", stringify!($ty), "`")]
                $variant(Vec<$ty>),
            )*
        }

        impl FlatColumn {
            /// The number of values.
            pub fn len(&self) -> usize {
                match self {
                    $(Self::$variant(values) => values.len(),)*
                }
            }

            /// Returns `true` if the column holds no values.
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// The element type.
            pub fn kind(&self) -> ElementKind {
                match self {
                    $(Self::$variant(_) => ElementKind::$variant,)*
                }
            }

            /// Widen every value to `f64` (`true`/`false` become `1.0`/`0.0`).
            pub fn to_f64(&self) -> Vec<f64> {
                match self {
                    $(Self::$variant(values) => values.iter().map(|&v| v.into_f64()).collect(),)*
                }
            }
        }

        $(
            impl From<Vec<$ty>> for FlatColumn {
                fn from(values: Vec<$ty>) -> Self {
                    Self::$variant(values)
                }
            }
        )*

        /// A per-event list column which keeps the element type it was read with.
        #[derive(Clone, Debug, PartialEq)]
        pub enum JaggedColumn {
            $(
                #[doc = concat!("A jagged column of `", stringify!($ty), "`")]
                $variant(Jagged<$ty>),
            )*
        }

        impl JaggedColumn {
            /// The number of rows (events).
            pub fn n_rows(&self) -> usize {
                match self {
                    $(Self::$variant(jagged) => jagged.n_rows(),)*
                }
            }

            /// The element type.
            pub fn kind(&self) -> ElementKind {
                match self {
                    $(Self::$variant(_) => ElementKind::$variant,)*
                }
            }

            /// Drop the row structure, keeping the element type.
            pub fn flatten(self) -> FlatColumn {
                match self {
                    $(Self::$variant(jagged) => FlatColumn::$variant(jagged.flatten()),)*
                }
            }
        }

        $(
            impl From<Jagged<$ty>> for JaggedColumn {
                fn from(jagged: Jagged<$ty>) -> Self {
                    Self::$variant(jagged)
                }
            }
        )*
    };
}

column_kinds!(
    Bool => bool,
    I16 => i16,
    U16 => u16,
    I32 => i32,
    U32 => u32,
    I64 => i64,
    F32 => f32,
    F64 => f64,
);

/// A Level-1 trigger jet, read from the split members of the ntuple's `TLorentzVector`s.
///
/// The four fields keep their ROOT member names in HDF5 (`fX`, `fY`, `fZ`, `fE`).
#[derive(hdf5::H5Type, Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct L1Jet {
    /// `fP.fX`
    #[hdf5(rename = "fX")]
    pub fx: f64,
    /// `fP.fY`
    #[hdf5(rename = "fY")]
    pub fy: f64,
    /// `fP.fZ`
    #[hdf5(rename = "fZ")]
    pub fz: f64,
    /// `fE`
    #[hdf5(rename = "fE")]
    pub fe: f64,
}

impl L1Jet {
    /// Create a jet from its raw `TLorentzVector` members.
    pub fn new(fx: f64, fy: f64, fz: f64, fe: f64) -> Self {
        Self { fx, fy, fz, fe }
    }

    /// The four-vector used for the jet kinematics: `(fX, fY, fZ)` as the momentum and `fE` in
    /// the fourth slot.
    ///
    /// The downstream analysis refers to that fourth slot as `pt`; it is filled from `fE`
    /// unchanged. Only the momentum part enters [`Vec4::pt`], [`Vec4::eta`] and [`Vec4::phi`].
    pub fn p4(&self) -> Vec4 {
        let pt = self.fe;
        Vec4::new(self.fx, self.fy, self.fz, pt)
    }
}

/// The columns read from one ntuple, before any reshaping.
#[derive(Clone, Debug, PartialEq)]
pub struct RawColumns {
    /// `jetRegionEt`, one list of region deposits per event
    pub deposits: JaggedColumn,
    /// `allL1Signals`, one list of labels per event
    pub labels: JaggedColumn,
    /// `recoPt_1`
    pub reco_pt: FlatColumn,
    /// `recoEta_1`
    pub reco_eta: FlatColumn,
    /// `recoPhi_1`
    pub reco_phi: FlatColumn,
    /// `l1Pt_1`
    pub l1_pt: FlatColumn,
    /// `allL1Jets`, one list of trigger jets per event
    pub l1_jets: Jagged<L1Jet>,
}

impl RawColumns {
    /// The number of events, taken from the trigger-jet column.
    pub fn n_events(&self) -> usize {
        self.l1_jets.n_rows()
    }
}

/// The ten flat arrays written to the output file.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    /// Region deposits of all events, concatenated
    pub deposits: FlatColumn,
    /// Labels of all events, concatenated
    pub labels: FlatColumn,
    /// Reference jet pseudorapidity, one per event
    pub reco_eta: FlatColumn,
    /// Reference jet azimuth, one per event
    pub reco_phi: FlatColumn,
    /// Reference jet transverse momentum, one per event
    pub reco_pt: FlatColumn,
    /// Level-1 transverse momentum, one per event
    pub l1_pt: FlatColumn,
    /// Trigger jets of all events, concatenated
    pub l1_jets: Vec<L1Jet>,
    /// Distance in $`(\eta, \phi)`$ between each trigger jet and its event's reference jet
    pub l1_jets_deltas: Vec<f64>,
    /// Transverse momentum of each trigger jet
    pub l1_jets_pts: Vec<f64>,
    /// Trigger jet count per event
    pub jets_per_event: Vec<i64>,
}

impl Dataset {
    /// The number of events.
    pub fn n_events(&self) -> usize {
        self.jets_per_event.len()
    }

    /// The total number of trigger jets.
    pub fn n_jets(&self) -> usize {
        self.l1_jets.len()
    }
}
