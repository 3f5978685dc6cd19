use serde::{Deserialize, Serialize};

/// A purchasable marker pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    /// Product identifier registered with the mobile store
    pub store_code: String,
    pub name: String,
    pub markers: u32,
    pub bonus: u32,
    /// Charge amount in KRW, verified against the provider's paid amount
    pub price: u32,
}

impl Product {
    /// Markers actually credited: base plus bonus.
    pub fn total_markers(&self) -> u32 {
        self.markers + self.bonus
    }
}

#[derive(Debug, Clone)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    /// The five standard marker packs.
    pub fn standard() -> Self {
        let packs = [
            (1, "marker5", "Marker pack (5)", 5, 0, 1000),
            (2, "marker10", "Marker pack (10)", 10, 1, 1900),
            (3, "marker30", "Marker pack (30)", 30, 5, 4900),
            (4, "marker50", "Marker pack (50)", 50, 10, 7900),
            (5, "marker100", "Marker pack (100)", 100, 25, 14900),
        ];

        ProductCatalog {
            products: packs
                .iter()
                .map(|&(id, store_code, name, markers, bonus, price)| Product {
                    id,
                    store_code: store_code.to_string(),
                    name: name.to_string(),
                    markers,
                    bonus,
                    price,
                })
                .collect(),
        }
    }

    pub fn by_id(&self, id: u32) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn by_store_code(&self, store_code: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.store_code == store_code)
    }

    pub fn all(&self) -> &[Product] {
        &self.products
    }
}
