//! Catalog product document.
//!
//! The whole document is persisted as one JSON column; `is_active`,
//! `is_hidden`, `catalog_number` and the timestamps are mirrored into
//! indexed columns for filtering.

use super::localized::{LocalizedTags, LocalizedText};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn yes() -> bool {
    true
}

fn default_currency() -> String {
    "RSD".into()
}

/// Finish family a color or gallery image belongs to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorCategory {
    #[default]
    Aloksaza,
    Plastifikacija,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlastificationTypes {
    #[serde(default)]
    pub sjajna: bool,
    #[serde(default)]
    pub matt: bool,
    #[serde(default)]
    pub strukturalna: bool,
    #[serde(default)]
    pub show_on_product: bool,
}

/// One image in a product gallery.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub url: String,
    pub public_id: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub is_main: bool,
    /// Color name this image shows; `None` marks a generic image.
    #[serde(default)]
    pub color_association: Option<String>,
    #[serde(default)]
    pub category_association: Option<ColorCategory>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Dimensions {
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Measurement {
    pub size: String,
    #[serde(default)]
    pub dimensions: Dimensions,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogInfo {
    pub catalog_number: String,
    pub category: LocalizedText,
    #[serde(default)]
    pub subcategory: LocalizedText,
    #[serde(default)]
    pub tags: LocalizedTags,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColorOption {
    pub name: LocalizedText,
    pub hex_code: String,
    #[serde(default)]
    pub category: ColorCategory,
    #[serde(default = "yes")]
    pub available: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SizeOption {
    pub name: LocalizedText,
    pub code: String,
    #[serde(default = "yes")]
    pub available: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Price {
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for Price {
    fn default() -> Self {
        Self {
            amount: 0.0,
            currency: default_currency(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    #[serde(default = "yes")]
    pub in_stock: bool,
    #[serde(default)]
    pub quantity: i64,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            in_stock: true,
            quantity: 0,
        }
    }
}

/// Downloadable catalog attached to a product.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPdf {
    pub url: String,
    pub download_url: String,
    pub public_id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: LocalizedText,
    pub description: LocalizedText,
    #[serde(default)]
    pub plastification_types: PlastificationTypes,
    #[serde(default)]
    pub gallery: Vec<GalleryImage>,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    pub catalog: CatalogInfo,
    #[serde(default)]
    pub colors: Vec<ColorOption>,
    #[serde(default)]
    pub sizes: Vec<SizeOption>,
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub catalog_pdf: Option<CatalogPdf>,
    pub is_active: bool,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a gallery reorder request.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItem {
    pub image_url: String,
    #[serde(default)]
    pub color_association: Option<String>,
}

impl Product {
    /// Shown on the public site.
    pub fn is_displayable(&self) -> bool {
        self.is_active && !self.is_hidden
    }

    /// Append freshly uploaded images. The first image of an empty gallery
    /// becomes the main image.
    pub fn append_images(&mut self, images: Vec<GalleryImage>) {
        let was_empty = self.gallery.is_empty();
        for (i, mut image) in images.into_iter().enumerate() {
            image.is_main = was_empty && i == 0;
            self.gallery.push(image);
        }
    }

    pub fn remove_image(&mut self, index: usize) -> Option<GalleryImage> {
        if index >= self.gallery.len() {
            return None;
        }
        let removed = self.gallery.remove(index);
        if removed.is_main {
            if let Some(first) = self.gallery.first_mut() {
                first.is_main = true;
            }
        }
        Some(removed)
    }

    /// Reorder the gallery by image URL. Listed images come first in the
    /// requested order; images the request does not mention keep their
    /// relative order at the end. Unknown URLs are ignored.
    pub fn reorder_gallery(&mut self, order: &[ReorderItem]) {
        let mut remaining = std::mem::take(&mut self.gallery);
        let mut reordered = Vec::with_capacity(remaining.len());
        for item in order {
            if let Some(pos) = remaining.iter().position(|img| img.url == item.image_url) {
                let mut image = remaining.remove(pos);
                if let Some(color) = item.color_association.as_ref().filter(|c| !c.is_empty()) {
                    image.color_association = Some(color.clone());
                }
                reordered.push(image);
            }
        }
        reordered.extend(remaining);
        self.gallery = reordered;
    }

    /// True when `name` matches a color option in any language.
    pub fn has_color(&self, name: &str) -> bool {
        self.colors.iter().any(|c| c.name.matches(name))
    }

    /// Images for a color: the color's own images, then generic images,
    /// then the whole gallery.
    pub fn images_by_color(&self, color: Option<&str>) -> Vec<&GalleryImage> {
        let generic = || -> Vec<&GalleryImage> {
            self.gallery
                .iter()
                .filter(|img| img.color_association.is_none())
                .collect()
        };
        let mut images = match color.filter(|c| !c.is_empty()) {
            Some(color) => {
                let specific: Vec<&GalleryImage> = self
                    .gallery
                    .iter()
                    .filter(|img| img.color_association.as_deref() == Some(color))
                    .collect();
                if specific.is_empty() {
                    generic()
                } else {
                    specific
                }
            }
            None => generic(),
        };
        if images.is_empty() {
            images = self.gallery.iter().collect();
        }
        images
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> GalleryImage {
        GalleryImage {
            url: url.into(),
            public_id: format!("pid-{url}"),
            alt: String::new(),
            is_main: false,
            color_association: None,
            category_association: None,
        }
    }

    fn product() -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            title: LocalizedText::sr("Profil"),
            description: LocalizedText::sr("Opis"),
            plastification_types: PlastificationTypes::default(),
            gallery: Vec::new(),
            measurements: Vec::new(),
            catalog: CatalogInfo {
                catalog_number: "NS-1".into(),
                category: LocalizedText::sr("Profili"),
                subcategory: LocalizedText::default(),
                tags: LocalizedTags::default(),
            },
            colors: vec![ColorOption {
                name: LocalizedText {
                    sr: Some("Bela".into()),
                    en: Some("White".into()),
                    de: None,
                },
                hex_code: "#ffffff".into(),
                category: ColorCategory::Aloksaza,
                available: true,
            }],
            sizes: Vec::new(),
            price: Price::default(),
            availability: Availability::default(),
            catalog_pdf: None,
            is_active: true,
            is_hidden: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn first_image_of_empty_gallery_is_main() {
        let mut p = product();
        p.append_images(vec![image("a"), image("b")]);
        p.append_images(vec![image("c")]);
        let mains: Vec<bool> = p.gallery.iter().map(|i| i.is_main).collect();
        assert_eq!(mains, vec![true, false, false]);
    }

    #[test]
    fn removing_main_image_promotes_next() {
        let mut p = product();
        p.append_images(vec![image("a"), image("b")]);
        let removed = p.remove_image(0).unwrap();
        assert_eq!(removed.url, "a");
        assert!(p.gallery[0].is_main);
        assert!(p.remove_image(5).is_none());
    }

    #[test]
    fn reorder_keeps_unlisted_images_at_end() {
        let mut p = product();
        p.append_images(vec![image("a"), image("b"), image("c")]);
        p.reorder_gallery(&[
            ReorderItem {
                image_url: "c".into(),
                color_association: Some("Bela".into()),
            },
            ReorderItem {
                image_url: "missing".into(),
                color_association: None,
            },
        ]);
        let urls: Vec<&str> = p.gallery.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["c", "a", "b"]);
        assert_eq!(p.gallery[0].color_association.as_deref(), Some("Bela"));
    }

    #[test]
    fn images_by_color_falls_back() {
        let mut p = product();
        let mut white = image("white");
        white.color_association = Some("Bela".into());
        p.gallery = vec![white, image("generic")];

        let urls = |imgs: Vec<&GalleryImage>| -> Vec<String> {
            imgs.into_iter().map(|i| i.url.clone()).collect()
        };
        assert_eq!(urls(p.images_by_color(Some("Bela"))), vec!["white"]);
        assert_eq!(urls(p.images_by_color(Some("Crna"))), vec!["generic"]);
        assert_eq!(urls(p.images_by_color(None)), vec!["generic"]);

        p.gallery.truncate(1);
        assert_eq!(urls(p.images_by_color(None)), vec!["white"]);
    }

    #[test]
    fn color_lookup_matches_any_language() {
        let p = product();
        assert!(p.has_color("White"));
        assert!(p.has_color("Bela"));
        assert!(!p.has_color("Black"));
    }
}
