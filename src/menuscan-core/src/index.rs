use bson::Document;
use mongodb::options::IndexOptions;
use mongodb::IndexModel;

/// Secondary index definition, independent of the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Ascending key paths, in order
    pub keys: Vec<&'static str>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn ascending(keys: &[&'static str]) -> Self {
        Self {
            keys: keys.to_vec(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// MongoDB's default index name, e.g. `address.city_1`
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}_1", k))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn to_model(&self) -> IndexModel {
        let mut keys = Document::new();
        for key in &self.keys {
            keys.insert(*key, 1_i32);
        }

        IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(Some(self.name()))
                    .unique(Some(self.unique))
                    .build(),
            )
            .build()
    }
}

/// The fixed index set rebuilt by the installer
pub fn restaurant_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::ascending(&["restaurantId"]).unique(),
        IndexSpec::ascending(&["owners.firstName", "owners.lastName"]),
        IndexSpec::ascending(&["address.city"]),
        IndexSpec::ascending(&["address.state"]),
        IndexSpec::ascending(&["address.country"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_names() {
        let names: Vec<String> = restaurant_indexes().iter().map(|i| i.name()).collect();
        assert_eq!(
            names,
            vec![
                "restaurantId_1",
                "owners.firstName_1_owners.lastName_1",
                "address.city_1",
                "address.state_1",
                "address.country_1",
            ]
        );
    }

    #[test]
    fn test_only_identifier_is_unique() {
        let indexes = restaurant_indexes();
        assert!(indexes[0].unique);
        assert!(indexes[1..].iter().all(|i| !i.unique));
    }

    #[test]
    fn test_compound_model_keeps_key_order() {
        let model = IndexSpec::ascending(&["owners.firstName", "owners.lastName"]).to_model();
        let keys: Vec<&String> = model.keys.keys().collect();
        assert_eq!(keys, vec!["owners.firstName", "owners.lastName"]);
        let options = model.options.unwrap();
        assert_eq!(options.name.as_deref(), Some("owners.firstName_1_owners.lastName_1"));
        assert_eq!(options.unique, Some(false));
    }
}
