use std::collections::{BTreeMap, BTreeSet};

use utility::geo::BoundingBox;

/// Edge length of a grid cell in degrees, roughly 5.5 km of latitude.
pub const CELL_SIZE_DEGREES: f64 = 0.05;

type Cell = (i32, i32);

/// Spatial index over points, bucketed into a latitude/longitude grid.
///
/// Rows and columns are kept in ordered maps, so a bounding box query only
/// visits occupied cells intersecting the box.
#[derive(Debug, Default)]
pub struct GridIndex {
    rows: BTreeMap<i32, BTreeMap<i32, BTreeSet<String>>>,
    len: usize,
}

fn row_of(latitude: f64) -> i32 {
    ((latitude + 90.0) / CELL_SIZE_DEGREES).floor() as i32
}

fn column_of(longitude: f64) -> i32 {
    ((longitude + 180.0) / CELL_SIZE_DEGREES).floor() as i32
}

fn cell_of(latitude: f64, longitude: f64) -> Cell {
    (row_of(latitude), column_of(longitude))
}

impl GridIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, key: &str, latitude: f64, longitude: f64) {
        let (row, column) = cell_of(latitude, longitude);
        let inserted = self
            .rows
            .entry(row)
            .or_default()
            .entry(column)
            .or_default()
            .insert(key.to_owned());
        if inserted {
            self.len += 1;
        }
    }

    pub fn remove(&mut self, key: &str, latitude: f64, longitude: f64) -> bool {
        let (row, column) = cell_of(latitude, longitude);
        let Some(columns) = self.rows.get_mut(&row) else {
            return false;
        };
        let Some(keys) = columns.get_mut(&column) else {
            return false;
        };
        let removed = keys.remove(key);
        if keys.is_empty() {
            columns.remove(&column);
        }
        if columns.is_empty() {
            self.rows.remove(&row);
        }
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Moves an entry to a new point. The entry is replaced, not edited in place.
    pub fn relocate(
        &mut self,
        key: &str,
        from: (f64, f64),
        to: (f64, f64),
    ) {
        if cell_of(from.0, from.1) != cell_of(to.0, to.1) {
            self.remove(key, from.0, from.1);
            self.insert(key, to.0, to.1);
        }
    }

    /// Keys of all entries whose cell intersects the bounding box. May contain
    /// entries slightly outside the box, never misses one inside it.
    pub fn candidates(&self, bbox: &BoundingBox) -> Vec<String> {
        let min_row = row_of(bbox.min_latitude);
        let max_row = row_of(bbox.max_latitude);
        let mut result = vec![];
        for (_, columns) in self.rows.range(min_row..=max_row) {
            for (min_lon, max_lon) in &bbox.longitude_spans {
                let min_column = column_of(*min_lon);
                let max_column = column_of(*max_lon);
                for (_, keys) in columns.range(min_column..=max_column) {
                    result.extend(keys.iter().cloned());
                }
            }
        }
        // spans never overlap, but a key must only be reported once
        result.sort();
        result.dedup();
        result
    }
}

#[cfg(test)]
mod tests {
    use utility::geo::calculate_bounding_box;

    use super::*;

    #[test]
    fn finds_entries_inside_box_only() {
        let mut index = GridIndex::new();
        index.insert("near", 12.9716, 77.5946);
        index.insert("far", 13.5, 78.2);
        assert_eq!(index.len(), 2);

        let bbox = calculate_bounding_box(12.9716, 77.5956, 2_000.0);
        assert_eq!(index.candidates(&bbox), vec!["near".to_owned()]);
    }

    #[test]
    fn remove_and_relocate() {
        let mut index = GridIndex::new();
        index.insert("a", 10.0, 10.0);
        index.relocate("a", (10.0, 10.0), (-33.86, 151.2));

        let old = calculate_bounding_box(10.0, 10.0, 1_000.0);
        let new = calculate_bounding_box(-33.86, 151.2, 1_000.0);
        assert!(index.candidates(&old).is_empty());
        assert_eq!(index.candidates(&new), vec!["a".to_owned()]);

        assert!(index.remove("a", -33.86, 151.2));
        assert!(!index.remove("a", -33.86, 151.2));
        assert!(index.is_empty());
    }

    #[test]
    fn spans_the_antimeridian() {
        let mut index = GridIndex::new();
        index.insert("east", 0.0, 179.9995);
        index.insert("west", 0.0, -179.9995);
        let bbox = calculate_bounding_box(0.0, 180.0, 500.0);
        assert_eq!(
            index.candidates(&bbox),
            vec!["east".to_owned(), "west".to_owned()]
        );
    }

    #[test]
    fn edge_coordinates_map_to_cells() {
        let mut index = GridIndex::new();
        index.insert("pole", 90.0, 180.0);
        index.insert("south", -90.0, -180.0);
        let bbox = calculate_bounding_box(89.9999, 0.0, 1_000.0);
        assert_eq!(index.candidates(&bbox), vec!["pole".to_owned()]);
    }
}
