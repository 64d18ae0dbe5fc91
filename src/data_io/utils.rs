/// Utility functions for dataset metadata
use super::{AttributeValue, Attributes};

/// Fields written by the dataset generator
pub const GENERATED_FIELDS: &[&str] = &["u", "v", "t"];

/// Build an attribute map from string pairs
pub fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), AttributeValue::from(*v)))
        .collect()
}

/// Long name and units for the variables this crate produces
pub fn get_variable_attributes(variable_name: &str) -> Attributes {
    match variable_name {
        "u" => attrs(&[("long_name", "zonal wind"), ("units", "m/s")]),
        "v" => attrs(&[("long_name", "meridional wind"), ("units", "m/s")]),
        "t" => attrs(&[("long_name", "temperature"), ("units", "K")]),
        "p" => attrs(&[("long_name", "pressure"), ("units", "hPa")]),
        "emf" => attrs(&[("long_name", "eddy momentum flux"), ("units", "m**2/s**2")]),
        "ehf" => attrs(&[("long_name", "eddy heat flux"), ("units", "K*m/s")]),
        _ => Attributes::new(),
    }
}

/// CF attributes for coordinate variables; `standard_name` mirrors `long_name`
pub fn get_coordinate_attributes(coordinate_name: &str) -> Attributes {
    let mut out = match coordinate_name {
        "time" => attrs(&[
            ("long_name", "time"),
            ("calendar", crate::time_utils::CALENDAR),
            ("units", crate::time_utils::TIME_UNITS),
            ("axis", "T"),
        ]),
        "plev" => attrs(&[("long_name", "pressure level"), ("units", "hPa"), ("axis", "Z")]),
        "lat" => attrs(&[("long_name", "latitude"), ("units", "degN"), ("axis", "Y")]),
        "lon" => attrs(&[("long_name", "longitude"), ("units", "degE"), ("axis", "X")]),
        "thlev" => attrs(&[("long_name", "potential_temperature"), ("units", "K")]),
        _ => Attributes::new(),
    };
    if let Some(long_name) = out.get("long_name").cloned() {
        if coordinate_name != "thlev" {
            out.insert("standard_name".to_string(), long_name);
        }
    }
    out
}
