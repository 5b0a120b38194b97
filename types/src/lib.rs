pub mod cache;
pub mod combined;
pub mod config;
pub mod nonstandard;
pub mod preset;
pub mod traits;

pub mod phase0 {
    pub mod beacon_state;
    pub mod consts;
    pub mod containers;
    pub mod primitives;

    mod container_impls;
}

pub mod altair {
    pub mod beacon_state;
    pub mod consts;
    pub mod containers;
    pub mod primitives;

    mod container_impls;
}

pub mod bellatrix {
    pub mod beacon_state;
    pub mod containers;
}

mod collections;
