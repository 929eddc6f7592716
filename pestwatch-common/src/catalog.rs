//! Pest label catalog and spreadsheet layout
//!
//! The catalog order is significant: model class indices map onto it
//! position by position.

/// The ten pest species the models are trained on, in class-index order
pub const PEST_LABELS: [&str; 10] = [
    "Aphid",
    "Armyworm",
    "Beetle",
    "Bollworm",
    "Grasshopper",
    "Leafhopper",
    "Mite",
    "Mosquito",
    "Stem Borer",
    "Thrips",
];

/// Location recorded when a detection does not name one
pub const DEFAULT_LOCATION: &str = "Default";

/// Sheet holding the full record set
pub const DATA_SHEET: &str = "Pest Detection Data";

/// Sheet holding the label + count projection used for charts
pub const VISUALIZATION_SHEET: &str = "Visualization";

pub const COLUMN_PEST_TYPE: &str = "Pest Type";
pub const COLUMN_COUNT: &str = "Count";
pub const COLUMN_LAST_UPDATED: &str = "Last Updated";
pub const COLUMN_LOCATION: &str = "Location";

/// Header row of the data sheet
pub const DATA_COLUMNS: [&str; 4] = [
    COLUMN_PEST_TYPE,
    COLUMN_COUNT,
    COLUMN_LAST_UPDATED,
    COLUMN_LOCATION,
];

/// Header row of the visualization sheet
pub const VISUALIZATION_COLUMNS: [&str; 2] = [COLUMN_PEST_TYPE, COLUMN_COUNT];

/// Label for a model class index, if the index is inside the catalog
pub fn label_for_class(class_id: usize) -> Option<&'static str> {
    PEST_LABELS.get(class_id).copied()
}

/// Class index of a catalog label (exact match)
pub fn class_index(label: &str) -> Option<usize> {
    PEST_LABELS.iter().position(|l| *l == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_ten_unique_labels() {
        let mut labels = PEST_LABELS.to_vec();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 10);
    }

    #[test]
    fn test_label_for_class_bounds() {
        assert_eq!(label_for_class(0), Some("Aphid"));
        assert_eq!(label_for_class(8), Some("Stem Borer"));
        assert_eq!(label_for_class(9), Some("Thrips"));
        assert_eq!(label_for_class(10), None);
    }

    #[test]
    fn test_class_index_round_trip() {
        for (idx, label) in PEST_LABELS.iter().enumerate() {
            assert_eq!(class_index(label), Some(idx));
        }
        assert_eq!(class_index("aphid"), None);
        assert_eq!(class_index("Locust"), None);
    }

    #[test]
    fn test_visualization_columns_are_prefix_of_data_columns() {
        assert_eq!(&DATA_COLUMNS[..2], &VISUALIZATION_COLUMNS[..]);
    }
}
