use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::models::{GenreIndex, ItemRecord};

use super::CalibrationError;

/// Item metadata resolved against the genre vocabulary
///
/// Each item maps to `(genre position, genre weight)` pairs where the weight
/// is an even split of the item over its genres. Items without genres are
/// spread evenly over the whole vocabulary.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    index: Arc<GenreIndex>,
    items: HashMap<String, Vec<(usize, f64)>>,
}

impl ItemCatalog {
    /// Builds the vocabulary from every genre seen in the metadata
    pub fn new(records: &[ItemRecord]) -> Result<Self, CalibrationError> {
        let index = Arc::new(GenreIndex::new(
            records
                .iter()
                .flat_map(|r| r.genres.iter())
                .map(|g| g.trim())
                .filter(|g| !g.is_empty()),
        ));

        if index.is_empty() {
            return Err(CalibrationError::EmptyVocabulary);
        }

        let uniform: Vec<(usize, f64)> = {
            let share = 1.0 / index.len() as f64;
            (0..index.len()).map(|ix| (ix, share)).collect()
        };

        let mut items = HashMap::with_capacity(records.len());
        let mut empty = 0usize;

        for record in records {
            let positions: BTreeSet<usize> = record
                .genres
                .iter()
                .filter_map(|g| index.position(g.trim()))
                .collect();

            let weights = if positions.is_empty() {
                empty += 1;
                uniform.clone()
            } else {
                let share = 1.0 / positions.len() as f64;
                positions.into_iter().map(|ix| (ix, share)).collect()
            };

            items.insert(record.item_id.clone(), weights);
        }

        if empty > 0 {
            tracing::debug!(
                items_without_genres = empty,
                "Items without genres are spread uniformly over the vocabulary"
            );
        }

        Ok(Self { index, items })
    }

    pub fn genre_index(&self) -> &Arc<GenreIndex> {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Genre weights of an item
    pub fn genre_weights(&self, item_id: &str) -> Result<&[(usize, f64)], CalibrationError> {
        self.items
            .get(item_id)
            .map(Vec::as_slice)
            .ok_or_else(|| CalibrationError::UnknownItem {
                item_id: item_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ItemRecord> {
        vec![
            ItemRecord::new("compadecida", ["Adventure", "Comedy"]),
            ItemRecord::new("amor", ["Drama"]),
            ItemRecord::new("sol", ["Adventure", "Crime", "Drama", "Western"]),
            ItemRecord::new("mystery", Vec::<String>::new()),
        ]
    }

    #[test]
    fn test_vocabulary_is_union_of_genres() {
        let catalog = ItemCatalog::new(&records()).unwrap();
        assert_eq!(
            catalog.genre_index().genres(),
            &["Adventure", "Comedy", "Crime", "Drama", "Western"]
        );
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_weights_split_evenly() {
        let catalog = ItemCatalog::new(&records()).unwrap();
        assert_eq!(
            catalog.genre_weights("compadecida").unwrap(),
            &[(0, 0.5), (1, 0.5)]
        );
        assert_eq!(catalog.genre_weights("amor").unwrap(), &[(3, 1.0)]);
        assert_eq!(catalog.genre_weights("sol").unwrap().len(), 4);
    }

    #[test]
    fn test_item_without_genres_is_uniform() {
        let catalog = ItemCatalog::new(&records()).unwrap();
        let weights = catalog.genre_weights("mystery").unwrap();
        assert_eq!(weights.len(), 5);
        assert!(weights.iter().all(|(_, w)| (*w - 0.2).abs() < 1e-12));
    }

    #[test]
    fn test_duplicate_genres_counted_once() {
        let catalog = ItemCatalog::new(&[ItemRecord::new("x", ["Drama", "Drama", " Action"])])
            .unwrap();
        assert_eq!(catalog.genre_weights("x").unwrap(), &[(0, 0.5), (1, 0.5)]);
    }

    #[test]
    fn test_unknown_item() {
        let catalog = ItemCatalog::new(&records()).unwrap();
        assert!(matches!(
            catalog.genre_weights("missing"),
            Err(CalibrationError::UnknownItem { .. })
        ));
    }

    #[test]
    fn test_empty_vocabulary_is_rejected() {
        let result = ItemCatalog::new(&[ItemRecord::new("x", Vec::<String>::new())]);
        assert!(matches!(result, Err(CalibrationError::EmptyVocabulary)));
    }
}
