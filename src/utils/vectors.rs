/// A three-vector with Cartesian components.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// The `x` component
    pub x: f64,
    /// The `y` component
    pub y: f64,
    /// The `z` component
    pub z: f64,
}

impl Vec3 {
    /// Create a new three-vector from its components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The magnitude of the component transverse to the `z`-axis.
    pub fn pt(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// The azimuthal angle in $`(-\pi, \pi]`$.
    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }

    /// The pseudorapidity $`\eta = \sinh^{-1}(p_z / p_T)`$.
    ///
    /// A vector along the beam axis has infinite pseudorapidity (with the sign of `z`), and the
    /// zero vector gives `NaN`.
    pub fn eta(&self) -> f64 {
        (self.z / self.pt()).asinh()
    }
}

/// A four-vector stored as `(x, y, z, t)`.
///
/// When used as a four-momentum, `(x, y, z)` is the three-momentum and `t` is the energy-like
/// component.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec4 {
    /// The `x` component
    pub x: f64,
    /// The `y` component
    pub y: f64,
    /// The `z` component
    pub z: f64,
    /// The fourth (time-like) component
    pub t: f64,
}

impl Vec4 {
    /// Create a new four-vector from its components.
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self {
            x: px,
            y: py,
            z: pz,
            t: e,
        }
    }

    /// The spatial part of the four-vector.
    pub fn vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// The transverse momentum, computed from `px` and `py` only.
    pub fn pt(&self) -> f64 {
        self.vec3().pt()
    }

    /// The pseudorapidity of the spatial part.
    pub fn eta(&self) -> f64 {
        self.vec3().eta()
    }

    /// The azimuthal angle of the spatial part.
    pub fn phi(&self) -> f64 {
        self.vec3().phi()
    }
}

/// The distance between two directions in the $`(\eta, \phi)`$ plane,
/// $`\sqrt{(\eta_a - \eta_b)^2 + (\phi_a - \phi_b)^2}`$.
///
/// The azimuthal difference is used as-is: it is *not* wrapped into $`[-\pi, \pi]`$.
pub fn delta_r(eta_a: f64, phi_a: f64, eta_b: f64, phi_b: f64) -> f64 {
    (eta_a - eta_b).hypot(phi_a - phi_b)
}
