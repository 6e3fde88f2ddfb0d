//! Merchant category codes (ISO 18245) mapped to spending categories.

/// Known MCC codes and their category names, sorted by code.
const MCC_CATEGORIES: &[(u16, &str)] = &[
    (4111, "Transportation"),
    (4112, "Railways"),
    (4121, "Taxi & Rideshare"),
    (4131, "Bus Lines"),
    (4784, "Tolls & Fees"),
    (4789, "Transportation Services"),
    (4829, "Money Transfer"),
    (5411, "Groceries"),
    (5412, "Convenience Stores"),
    (5422, "Meat & Seafood"),
    (5441, "Candy & Confectionery"),
    (5451, "Dairy Stores"),
    (5462, "Bakeries"),
    (5499, "Food Stores"),
    (5541, "Gas Stations"),
    (5542, "Fuel"),
    (5651, "Clothing"),
    (5691, "Clothing Stores"),
    (5812, "Restaurants"),
    (5813, "Bars & Nightclubs"),
    (5814, "Fast Food"),
    (5815, "Digital Goods"),
    (5816, "Digital Games"),
    (5817, "Digital Services"),
    (5818, "Digital Purchases"),
    (5912, "Pharmacy"),
    (5921, "Alcohol"),
    (5941, "Sporting Goods"),
    (5942, "Bookstores"),
    (5943, "Office Supplies"),
    (5944, "Jewelry"),
    (5945, "Toys & Games"),
    (5977, "Cosmetics"),
    (5999, "Retail"),
    (6010, "ATM Cash"),
    (6011, "Cash Withdrawal"),
    (6012, "Financial Services"),
    (6051, "Currency Exchange"),
    (6211, "Investments"),
    (6300, "Insurance"),
    (7011, "Hotels"),
    (7230, "Beauty Salons"),
    (7299, "Other Services"),
    (7372, "Software"),
    (7375, "Information Services"),
    (7379, "Computer Services"),
    (7392, "Consulting"),
    (7399, "Business Services"),
    (7512, "Car Rental"),
    (7523, "Parking"),
    (7832, "Cinema"),
    (7941, "Sports Events"),
    (7999, "Recreation Services"),
    (8011, "Medical"),
    (8021, "Dentist"),
    (8099, "Health Services"),
    (8211, "Schools"),
    (8299, "Education"),
    (8398, "Charity"),
    (9311, "Tax Payments"),
    (9399, "Government Services"),
];

/// Returns the category name for `mcc`, or `Other (<mcc>)` when unknown.
pub(crate) fn category_for(mcc: u32) -> String {
    u16::try_from(mcc)
        .ok()
        .and_then(|code| {
            MCC_CATEGORIES
                .binary_search_by_key(&code, |&(known, _)| known)
                .ok()
        })
        .and_then(|idx| MCC_CATEGORIES.get(idx))
        .map_or_else(|| format!("Other ({mcc})"), |&(_, name)| name.to_owned())
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test code")]
mod tests {
    use super::{MCC_CATEGORIES, category_for};

    #[test]
    fn table_is_sorted_for_binary_search() {
        assert!(MCC_CATEGORIES.windows(2).all(|pair| match *pair {
            [(a, _), (b, _)] => a < b,
            _ => false,
        }));
    }

    #[test]
    fn known_codes_resolve() {
        assert_eq!(category_for(5411), "Groceries");
        assert_eq!(category_for(4121), "Taxi & Rideshare");
        assert_eq!(category_for(9399), "Government Services");
    }

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(category_for(1234), "Other (1234)");
        assert_eq!(category_for(0), "Other (0)");
        assert_eq!(category_for(70_000), "Other (70000)");
    }
}
