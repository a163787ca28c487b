use std::collections::BTreeMap;

use crate::registry::{DatasetDef, RegistryDef};

/// Directory the compiled-in dataset paths are relative to by default.
pub const DEFAULT_DATA_ROOT: &str = "/mnt/seenas2/data/standalone/data";

const JET_DOMAIN: [f32; 2] = [-9.797_012e-16, 0.001_978_810_4];

fn dataset(name: &str, timestep: i32, file: &str, dims: [u64; 3], domain: [f32; 2]) -> DatasetDef {
    DatasetDef {
        name: name.to_string(),
        timestep,
        path: file.into(),
        dimensions: dims,
        domain,
    }
}

fn datasets() -> Vec<DatasetDef> {
    let mut out = vec![
        dataset(
            "supernova",
            0,
            "E_1335.dat",
            [432, 432, 432],
            [1.854_424_7e-15, 0.130_517_9],
        ),
        dataset(
            "magnetic",
            0,
            "magnetic-512-volume.raw",
            [512, 512, 512],
            [0.018_786_557, 24.195_253],
        ),
        dataset("teapot", 0, "teapot.raw", [256, 256, 178], [0.0, 255.0]),
        dataset(
            "tornado",
            0,
            "interp8536.280x490x490.float32.raw",
            [490, 490, 280],
            [0.022_513_824, 102.954_83],
        ),
        dataset(
            "turbine",
            0,
            "turbine_VMIN_EPS1.7_minPts40_X1589_Y698_Z1799_Full.raw",
            [1589, 698, 1799],
            [0.0, 0.026_069_42],
        ),
        dataset(
            "turbulence",
            0,
            "tacc-turbulence-256-volume.raw",
            [256, 256, 256],
            [1.406_510_8e-7, 150.661_88],
        ),
        dataset(
            "jet",
            0,
            "jet.001.264x396x66.float32.raw",
            [66, 396, 264],
            JET_DOMAIN,
        ),
    ];

    for t in 1..=18 {
        let file = format!("jet.{:03}.264x396x66.float32.raw", t + 1);
        out.push(dataset("jet", t, &file, [264, 396, 66], JET_DOMAIN));
    }

    out
}

fn color_maps() -> BTreeMap<String, Vec<[f32; 3]>> {
    let mut m = BTreeMap::new();
    m.insert(
        "viridis".to_string(),
        vec![
            [0.267, 0.005, 0.329],
            [0.279, 0.175, 0.483],
            [0.230, 0.322, 0.546],
            [0.173, 0.449, 0.558],
            [0.128, 0.567, 0.551],
            [0.158, 0.684, 0.502],
            [0.369, 0.789, 0.383],
            [0.678, 0.864, 0.190],
            [0.993, 0.906, 0.144],
        ],
    );
    m.insert(
        "grayscale".to_string(),
        vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
    );
    m.insert(
        "coolwarm".to_string(),
        vec![
            [0.230, 0.299, 0.754],
            [0.552, 0.690, 0.996],
            [0.866, 0.866, 0.866],
            [0.956, 0.604, 0.486],
            [0.706, 0.016, 0.150],
        ],
    );
    m
}

fn opacity_maps() -> BTreeMap<String, Vec<f32>> {
    let mut m = BTreeMap::new();
    m.insert(
        "ramp".to_string(),
        (0..=10).map(|i| i as f32 / 10.0).collect(),
    );
    m.insert("flat".to_string(), vec![0.5, 0.5]);
    m.insert("step".to_string(), vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    m
}

/// The compiled-in registry tables. Dataset paths are relative to the data root.
pub fn builtin_def() -> RegistryDef {
    RegistryDef {
        datasets: datasets(),
        color_maps: color_maps(),
        opacity_maps: opacity_maps(),
    }
}
