//! Documents shared by this crate's unit tests.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;

use trellis_core::{
    ClusteringOrder, DiscriminatorRegistry, Document, DocumentDescriptor, FieldDescriptor,
    FieldType, Row, TrellisResult, Value,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub product_id: String,
    pub created_at: DateTime<Utc>,
    pub rating: i32,
    pub body: Option<String>,
}

impl Review {
    pub fn sample(product_id: &str, second: i64) -> Self {
        Self {
            product_id: product_id.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap(),
            rating: 4,
            body: None,
        }
    }
}

impl Document for Review {
    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor::new("Review")
            .table("reviews")
            .field(FieldDescriptor::new("product_id", FieldType::Text).partition_key(0))
            .field(
                FieldDescriptor::new("created_at", FieldType::Timestamp)
                    .clustering_key(0, ClusteringOrder::Desc),
            )
            .field(FieldDescriptor::new("rating", FieldType::Int).index())
            .field(FieldDescriptor::new("body", FieldType::optional(FieldType::Text)))
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("product_id", self.product_id.clone())
            .with("created_at", self.created_at)
            .with("rating", self.rating)
            .with("body", self.body.clone())
    }

    fn from_row(row: &Row) -> TrellisResult<Self> {
        Ok(Self {
            product_id: row.get_as("product_id")?,
            created_at: row.get_as("created_at")?,
            rating: row.get_as("rating")?,
            body: row.get_as("body")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageViews {
    pub page: String,
    pub views: i64,
}

impl Document for PageViews {
    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor::new("PageViews")
            .field(FieldDescriptor::new("page", FieldType::Text).partition_key(0))
            .field(FieldDescriptor::new("views", FieldType::Int).counter())
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("page", self.page.clone())
            .with("views", Value::Counter(self.views))
    }

    fn from_row(row: &Row) -> TrellisResult<Self> {
        Ok(Self {
            page: row.get_as("page")?,
            views: row.get_as("views")?,
        })
    }
}

// ============================================================================
// POLYMORPHIC HIERARCHY
// ============================================================================

fn pet_descriptor() -> DocumentDescriptor {
    DocumentDescriptor::new("Pet")
        .keyspace("zoo")
        .field(FieldDescriptor::new("name", FieldType::Text).partition_key(0))
        .field(FieldDescriptor::new("kind", FieldType::Text).discriminator())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dog {
    pub name: String,
    pub good: bool,
}

impl Document for Dog {
    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor::new("Dog")
            .extends(pet_descriptor())
            .discriminator_value("dog")
            .field(FieldDescriptor::new("good", FieldType::Boolean).default_value(true))
    }

    fn to_row(&self) -> Row {
        Row::new().with("name", self.name.clone()).with("good", self.good)
    }

    fn from_row(row: &Row) -> TrellisResult<Self> {
        Ok(Self {
            name: row.get_as("name")?,
            good: row.get_as("good")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cat {
    pub name: String,
    pub lives: i32,
}

impl Cat {
    pub fn new(name: &str, lives: i32) -> Self {
        Self {
            name: name.to_string(),
            lives,
        }
    }
}

impl Document for Cat {
    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor::new("Cat")
            .extends(pet_descriptor())
            .discriminator_value("cat")
            .field(FieldDescriptor::new("lives", FieldType::Int))
    }

    fn to_row(&self) -> Row {
        Row::new().with("name", self.name.clone()).with("lives", self.lives)
    }

    fn from_row(row: &Row) -> TrellisResult<Self> {
        Ok(Self {
            name: row.get_as("name")?,
            lives: row.get_as("lives")?,
        })
    }
}

/// Base of the hierarchy; rows of unknown kinds load as `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum Pet {
    Dog(Dog),
    Cat(Cat),
    Other { name: String, kind: Option<String> },
}

impl From<Dog> for Pet {
    fn from(dog: Dog) -> Self {
        Pet::Dog(dog)
    }
}

impl From<Cat> for Pet {
    fn from(cat: Cat) -> Self {
        Pet::Cat(cat)
    }
}

static PET_REGISTRY: Lazy<TrellisResult<DiscriminatorRegistry<Pet>>> = Lazy::new(|| {
    DiscriminatorRegistry::new(|row| {
        Ok(Pet::Other {
            name: row.get_as("name")?,
            kind: row.get_as("kind")?,
        })
    })?
    .register::<Dog>()?
    .register::<Cat>()
});

impl Document for Pet {
    fn descriptor() -> DocumentDescriptor {
        pet_descriptor()
    }

    fn to_row(&self) -> Row {
        match self {
            Pet::Dog(dog) => dog.to_row().with("kind", "dog"),
            Pet::Cat(cat) => cat.to_row().with("kind", "cat"),
            Pet::Other { name, kind } => Row::new()
                .with("name", name.clone())
                .with("kind", kind.clone()),
        }
    }

    fn from_row(row: &Row) -> TrellisResult<Self> {
        match &*PET_REGISTRY {
            Ok(registry) => registry.resolve(row),
            Err(e) => Err(e.clone()),
        }
    }
}

pub fn dog_row(name: &str) -> Row {
    Row::new()
        .with("name", name)
        .with("kind", "dog")
        .with("good", true)
}

pub fn cat_row(name: &str, lives: i32) -> Row {
    Row::new()
        .with("name", name)
        .with("kind", "cat")
        .with("lives", lives)
}
