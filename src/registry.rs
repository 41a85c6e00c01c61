//! Serial-prefix to model mapping.

/// Which decoder table a model's fragments should be run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderId {
    HmSingleString,
    HmDualString,
    MiLegacy,
    PassThrough,
}

/// Static description of an inverter model: display name, how many
/// fragments one poll cycle is expected to produce, and which decoder
/// table applies to its command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub fragment_count: u8,
    pub decoder: DecoderId,
}

const REGISTRY: &[(&str, ModelDescriptor)] = &[
    (
        "1121",
        ModelDescriptor {
            name: "HM-300",
            fragment_count: 2,
            decoder: DecoderId::HmSingleString,
        },
    ),
    (
        "1141",
        ModelDescriptor {
            name: "HM-600",
            fragment_count: 2,
            decoder: DecoderId::HmSingleString,
        },
    ),
    (
        "1161",
        ModelDescriptor {
            name: "HM-1200",
            fragment_count: 4,
            decoder: DecoderId::HmDualString,
        },
    ),
    (
        "1020",
        ModelDescriptor {
            name: "MI-250",
            fragment_count: 2,
            decoder: DecoderId::MiLegacy,
        },
    ),
    (
        "1021",
        ModelDescriptor {
            name: "MI-300",
            fragment_count: 2,
            decoder: DecoderId::MiLegacy,
        },
    ),
    (
        "1040",
        ModelDescriptor {
            name: "MI-500",
            fragment_count: 2,
            decoder: DecoderId::MiLegacy,
        },
    ),
    (
        "1060",
        ModelDescriptor {
            name: "MI-1000",
            fragment_count: 2,
            decoder: DecoderId::MiLegacy,
        },
    ),
    (
        "1061",
        ModelDescriptor {
            name: "MI-1200",
            fragment_count: 4,
            decoder: DecoderId::MiLegacy,
        },
    ),
];

const UNKNOWN: ModelDescriptor = ModelDescriptor {
    name: "unknown",
    fragment_count: 1,
    decoder: DecoderId::PassThrough,
};

/// Looks up the model descriptor for a serial's 4-digit prefix.
///
/// An unmapped prefix never fails the lookup outright: it returns the
/// `unknown` descriptor (`fragments=1`, pass-through decoder) so the
/// engine can still poll the inverter and log `UnknownModel` once per
/// cycle, per the error-handling table.
pub fn lookup(prefix: &str) -> ModelDescriptor {
    REGISTRY
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, d)| *d)
        .unwrap_or(UNKNOWN)
}

pub fn is_known(prefix: &str) -> bool {
    REGISTRY.iter().any(|(p, _)| *p == prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prefixes_resolve() {
        assert_eq!(lookup("1161").name, "HM-1200");
        assert_eq!(lookup("1161").fragment_count, 4);
        assert_eq!(lookup("1040").decoder, DecoderId::MiLegacy);
    }

    #[test]
    fn unknown_prefix_falls_back() {
        let d = lookup("9999");
        assert_eq!(d.name, "unknown");
        assert_eq!(d.fragment_count, 1);
        assert_eq!(d.decoder, DecoderId::PassThrough);
        assert!(!is_known("9999"));
    }
}
