// face.rs — the six logical cube faces

/// A cube-map face. The discriminant doubles as the texture slot and the
/// draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CubeFace {
    PositiveX = 0,
    PositiveY, // top
    PositiveZ, // front
    NegativeX,
    NegativeY, // bottom
    NegativeZ, // back
}

impl CubeFace {
    pub const COUNT: usize = 6;

    pub const ALL: [CubeFace; CubeFace::COUNT] = [
        CubeFace::PositiveX,
        CubeFace::PositiveY,
        CubeFace::PositiveZ,
        CubeFace::NegativeX,
        CubeFace::NegativeY,
        CubeFace::NegativeZ,
    ];

    /// Key expected in a cube-map source mapping.
    pub fn key(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "PositiveX",
            CubeFace::PositiveY => "PositiveY",
            CubeFace::PositiveZ => "PositiveZ",
            CubeFace::NegativeX => "NegativeX",
            CubeFace::NegativeY => "NegativeY",
            CubeFace::NegativeZ => "NegativeZ",
        }
    }

    pub fn from_key(key: &str) -> Option<CubeFace> {
        CubeFace::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for CubeFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_and_slots_are_dense() {
        for (slot, face) in CubeFace::ALL.into_iter().enumerate() {
            assert_eq!(face.index(), slot);
            assert_eq!(CubeFace::from_key(face.key()), Some(face));
        }
        assert_eq!(CubeFace::from_key("positivex"), None);
        assert_eq!(CubeFace::from_key("Top"), None);
    }
}
