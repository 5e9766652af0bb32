//! Product records and their table-store wire shape.
//!
//! [`ProductRow`] mirrors the `products` table exactly as the REST API
//! returns it, with every column optional and the price left as raw JSON.
//! [`Product`] is the validated form the rest of the workspace uses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::ProductId;
use super::price::parse_price;
use super::text::Bilingual;

/// Errors raised while validating product rows or admin input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// A required column is missing or null.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A column is present but unusable.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Column name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: Bilingual,
    pub category: Bilingual,
    pub product_type: Bilingual,
    pub ingredients: Bilingual,
    pub description: Bilingual,
    /// Unit price; non-numeric wire values are normalised to zero.
    pub price: Decimal,
    /// Units in stock.
    pub quantity: u32,
    pub image_url: Option<String>,
    /// Soft-delete flag. Deleted products are filtered out, never purged.
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Category grouping key.
    #[must_use]
    pub fn category_key(&self) -> String {
        self.category.key()
    }

    /// Type grouping key (only meaningful within a category).
    #[must_use]
    pub fn type_key(&self) -> String {
        self.product_type.key()
    }

    /// Whether the product can currently be ordered.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.quantity > 0 && !self.is_deleted
    }
}

/// Raw `products` row as returned by the table-store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductRow {
    pub id: Option<i64>,
    pub name_ar: Option<String>,
    pub name_en: Option<String>,
    pub category_ar: Option<String>,
    pub category_en: Option<String>,
    pub type_ar: Option<String>,
    pub type_en: Option<String>,
    pub ingredients_ar: Option<String>,
    pub ingredients_en: Option<String>,
    pub description_ar: Option<String>,
    pub description_en: Option<String>,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub quantity: Value,
    pub image_url: Option<String>,
    pub is_deleted: Option<bool>,
    pub created_at: Option<String>,
}

fn bilingual(ar: Option<String>, en: Option<String>) -> Bilingual {
    Bilingual::new(ar.unwrap_or_default(), en.unwrap_or_default())
}

fn parse_quantity(value: &Value) -> u32 {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            #[allow(clippy::cast_possible_truncation)] // saturating float-to-int cast
            n.as_f64().map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    raw.map_or(0, |q| u32::try_from(q.max(0)).unwrap_or(u32::MAX))
}

impl TryFrom<ProductRow> for Product {
    type Error = RowError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let id = row.id.ok_or(RowError::MissingField("id"))?;
        let created_raw = row
            .created_at
            .as_deref()
            .ok_or(RowError::MissingField("created_at"))?;
        let created_at = DateTime::parse_from_rfc3339(created_raw)
            .map_err(|e| RowError::InvalidField {
                field: "created_at",
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id: ProductId::new(id),
            name: bilingual(row.name_ar, row.name_en),
            category: bilingual(row.category_ar, row.category_en),
            product_type: bilingual(row.type_ar, row.type_en),
            ingredients: bilingual(row.ingredients_ar, row.ingredients_en),
            description: bilingual(row.description_ar, row.description_en),
            price: parse_price(&row.price),
            quantity: parse_quantity(&row.quantity),
            image_url: row.image_url.filter(|url| !url.trim().is_empty()),
            is_deleted: row.is_deleted.unwrap_or(false),
            created_at,
        })
    }
}

/// Input for creating a product from the admin back-office.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: Bilingual,
    #[serde(default)]
    pub category: Bilingual,
    #[serde(default)]
    pub product_type: Bilingual,
    #[serde(default)]
    pub ingredients: Bilingual,
    #[serde(default)]
    pub description: Bilingual,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewProduct {
    /// Check the input before it is sent to the table-store.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the price is negative.
    pub fn validate(&self) -> Result<(), RowError> {
        if self.name.is_blank() {
            return Err(RowError::MissingField("name"));
        }
        validate_price(self.price)
    }

    /// Encode as a `products` row body.
    #[must_use]
    pub fn to_row(&self) -> Value {
        let mut row = Map::new();
        put_bilingual(&mut row, "name", &self.name);
        put_bilingual(&mut row, "category", &self.category);
        put_bilingual(&mut row, "type", &self.product_type);
        put_bilingual(&mut row, "ingredients", &self.ingredients);
        put_bilingual(&mut row, "description", &self.description);
        row.insert("price".into(), Value::String(self.price.to_string()));
        row.insert("quantity".into(), Value::from(self.quantity));
        row.insert(
            "image_url".into(),
            self.image_url.clone().map_or(Value::Null, Value::String),
        );
        row.insert("is_deleted".into(), Value::Bool(false));
        Value::Object(row)
    }
}

/// Partial update of a product. Only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<Bilingual>,
    #[serde(default)]
    pub category: Option<Bilingual>,
    #[serde(default)]
    pub product_type: Option<Bilingual>,
    #[serde(default)]
    pub ingredients: Option<Bilingual>,
    #[serde(default)]
    pub description: Option<Bilingual>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ProductPatch {
    /// True when the patch would not change anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.product_type.is_none()
            && self.ingredients.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.quantity.is_none()
            && self.image_url.is_none()
    }

    /// Check the patch before it is sent to the table-store.
    ///
    /// # Errors
    ///
    /// Returns an error if the patch is empty, blanks the name, or sets a
    /// negative price.
    pub fn validate(&self) -> Result<(), RowError> {
        if self.is_empty() {
            return Err(RowError::InvalidField {
                field: "patch",
                reason: "no fields to update".to_string(),
            });
        }
        if self.name.as_ref().is_some_and(Bilingual::is_blank) {
            return Err(RowError::MissingField("name"));
        }
        self.price.map_or(Ok(()), validate_price)
    }

    /// Encode the set fields as a `products` row body.
    #[must_use]
    pub fn to_row(&self) -> Value {
        let mut row = Map::new();
        let texts = [
            ("name", &self.name),
            ("category", &self.category),
            ("type", &self.product_type),
            ("ingredients", &self.ingredients),
            ("description", &self.description),
        ];
        for (column, value) in texts {
            if let Some(text) = value {
                put_bilingual(&mut row, column, text);
            }
        }
        if let Some(price) = self.price {
            row.insert("price".into(), Value::String(price.to_string()));
        }
        if let Some(quantity) = self.quantity {
            row.insert("quantity".into(), Value::from(quantity));
        }
        if let Some(url) = &self.image_url {
            row.insert("image_url".into(), Value::String(url.clone()));
        }
        Value::Object(row)
    }
}

fn validate_price(price: Decimal) -> Result<(), RowError> {
    if price.is_sign_negative() {
        return Err(RowError::InvalidField {
            field: "price",
            reason: "must not be negative".to_string(),
        });
    }
    Ok(())
}

fn put_bilingual(row: &mut Map<String, Value>, column: &str, text: &Bilingual) {
    row.insert(format!("{column}_ar"), Value::String(text.ar.clone()));
    row.insert(format!("{column}_en"), Value::String(text.en.clone()));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> ProductRow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_row_converts_full_product() {
        let product = Product::try_from(row(json!({
            "id": 3,
            "name_ar": "دجاج مشوي",
            "name_en": "Grilled Chicken",
            "category_en": "Chicken",
            "type_en": "Whole",
            "price": "1000",
            "quantity": 5,
            "image_url": "https://cdn.example/chicken.png",
            "is_deleted": false,
            "created_at": "2024-05-01T10:00:00.123456+00:00"
        })))
        .unwrap();

        assert_eq!(product.id, ProductId::new(3));
        assert_eq!(product.name.en, "Grilled Chicken");
        assert_eq!(product.category_key(), "chicken");
        assert_eq!(product.price, Decimal::from(1000));
        assert_eq!(product.quantity, 5);
        assert!(product.in_stock());
    }

    #[test]
    fn test_row_without_id_is_rejected() {
        let err = Product::try_from(row(json!({"created_at": "2024-05-01T10:00:00Z"})))
            .unwrap_err();
        assert_eq!(err, RowError::MissingField("id"));
    }

    #[test]
    fn test_row_with_bad_timestamp_is_rejected() {
        let err = Product::try_from(row(json!({"id": 1, "created_at": "yesterday"})))
            .unwrap_err();
        assert!(matches!(
            err,
            RowError::InvalidField {
                field: "created_at",
                ..
            }
        ));
    }

    #[test]
    fn test_row_defaults_loose_fields() {
        let product = Product::try_from(row(json!({
            "id": 9,
            "price": null,
            "quantity": -4,
            "image_url": "  ",
            "created_at": "2024-05-01T10:00:00Z"
        })))
        .unwrap();

        assert_eq!(product.price, Decimal::ZERO);
        assert_eq!(product.quantity, 0);
        assert!(product.image_url.is_none());
        assert!(!product.is_deleted);
        assert!(product.name.is_blank());
    }

    #[test]
    fn test_new_product_validation() {
        let mut input = NewProduct {
            name: Bilingual::new("بيض", "Eggs"),
            price: Decimal::from(20),
            ..NewProduct::default()
        };
        assert!(input.validate().is_ok());

        input.price = Decimal::from(-1);
        assert!(input.validate().is_err());

        input.price = Decimal::ONE;
        input.name = Bilingual::default();
        assert_eq!(input.validate(), Err(RowError::MissingField("name")));
    }

    #[test]
    fn test_new_product_row_columns() {
        let input = NewProduct {
            name: Bilingual::new("بيض", "Eggs"),
            price: Decimal::new(1250, 2),
            quantity: 30,
            ..NewProduct::default()
        };
        let body = input.to_row();
        assert_eq!(body["name_en"], "Eggs");
        assert_eq!(body["type_ar"], "");
        assert_eq!(body["price"], "12.50");
        assert_eq!(body["quantity"], 30);
        assert_eq!(body["is_deleted"], false);
    }

    #[test]
    fn test_patch_only_writes_set_fields() {
        let patch = ProductPatch {
            price: Some(Decimal::from(15)),
            ..ProductPatch::default()
        };
        let body = patch.to_row();
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(body["price"], "15");
    }

    #[test]
    fn test_empty_patch_is_invalid() {
        assert!(ProductPatch::default().validate().is_err());
    }
}
