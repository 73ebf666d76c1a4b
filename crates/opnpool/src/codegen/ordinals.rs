use crate::catalog::Catalog;
use crate::catalog::Category;

/// Keys of one category paired with the ordinal their entity is constructed with.
///
/// Computed from the catalog on every run and never stored; the same
/// positions are what `sync` writes into `opnpool_ids.h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalAssignment<'a> {
    category: Category,
    keys: &'a [String],
}

impl<'a> OrdinalAssignment<'a> {
    pub fn new(category: Category, keys: &'a [String]) -> Self {
        Self { category, keys }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// `(key, ordinal)` in catalog order
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, u8)> + '_ {
        // Catalog construction caps categories at 256 keys, so every index fits
        self.keys.iter().zip(0..=u8::MAX).map(|(key, ordinal)| (key.as_str(), ordinal))
    }

    pub fn get(&self, key: &str) -> Option<u8> {
        self.iter().find(|(k, _)| *k == key).map(|(_, ordinal)| ordinal)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One assignment per declared category, in generation order
pub fn assignments(catalog: &Catalog) -> impl Iterator<Item = OrdinalAssignment<'_>> {
    catalog
        .categories()
        .map(|(category, keys)| OrdinalAssignment::new(category, keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MAX_MEMBERS;
    use crate::sync::parse_members;
    use crate::sync::render_block;

    #[test]
    fn test_positions() {
        let catalog = Catalog::builtin();
        let switches = assignments(catalog)
            .find(|a| a.category() == Category::Switch)
            .unwrap();

        assert_eq!(switches.get("spa"), Some(0));
        assert_eq!(switches.get("pool"), Some(5));
        assert_eq!(switches.get("pool_climate"), None);
        assert_eq!(switches.len(), 9);
    }

    #[test]
    fn test_matches_rendered_header() {
        let catalog = Catalog::builtin();

        for assignment in assignments(catalog) {
            let keys = catalog.keys(assignment.category()).unwrap();
            let block = render_block(assignment.category(), keys, "\n").unwrap();
            let body = &block[block.find('{').unwrap() + 1..block.rfind('}').unwrap()];
            let members = parse_members(body).unwrap();

            let ordinals: Vec<(String, u64)> = assignment
                .iter()
                .map(|(key, ordinal)| (key.to_ascii_uppercase(), u64::from(ordinal)))
                .collect();
            assert_eq!(members, ordinals, "{}", assignment.category());
        }
    }

    #[test]
    fn test_full_category_reaches_255() {
        let keys: Vec<String> = (0..MAX_MEMBERS).map(|i| format!("k{}", i)).collect();
        let assignment = OrdinalAssignment::new(Category::Sensor, &keys);

        assert_eq!(assignment.iter().count(), MAX_MEMBERS);
        assert_eq!(assignment.get("k255"), Some(255));
    }
}
