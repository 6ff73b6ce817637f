/// Plain three- and four-vectors with the collider coordinates (`pt`, `eta`, `phi`) used to
/// compare trigger jets with reconstructed jets.
pub mod vectors;
