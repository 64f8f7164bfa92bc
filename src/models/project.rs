//! Completed-project document with an explicitly ordered gallery.

use super::localized::{LocalizedTags, LocalizedText};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_PROJECT_IMAGES: usize = 25;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectImage {
    pub url: String,
    pub public_id: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub order: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    #[serde(default)]
    pub title: LocalizedText,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub category: LocalizedText,
    #[serde(default)]
    pub client: LocalizedText,
    #[serde(default)]
    pub location: LocalizedText,
    #[serde(default)]
    pub gallery: Vec<ProjectImage>,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: LocalizedTags,
    #[serde(default)]
    pub featured: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Renumber `order` from 0 and mark index 0 as the main image.
    pub fn renumber_gallery(&mut self) {
        for (i, image) in self.gallery.iter_mut().enumerate() {
            image.order = i as u32;
            image.is_main = i == 0;
        }
    }

    pub fn append_images(&mut self, images: Vec<ProjectImage>) {
        self.gallery.extend(images);
        self.renumber_gallery();
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ProjectImage> {
        if index >= self.gallery.len() {
            return None;
        }
        let removed = self.gallery.remove(index);
        self.renumber_gallery();
        Some(removed)
    }

    /// Reorder by image URL; unlisted images keep their relative order at
    /// the end.
    pub fn reorder_gallery(&mut self, urls: &[String]) {
        let mut remaining = std::mem::take(&mut self.gallery);
        let mut reordered = Vec::with_capacity(remaining.len());
        for url in urls {
            if let Some(pos) = remaining.iter().position(|img| &img.url == url) {
                reordered.push(remaining.remove(pos));
            }
        }
        reordered.extend(remaining);
        self.gallery = reordered;
        self.renumber_gallery();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with(urls: &[&str]) -> Project {
        let now = Utc::now();
        let mut project = Project {
            id: Uuid::new_v4(),
            title: LocalizedText::sr("Fasada"),
            description: LocalizedText::default(),
            category: LocalizedText::default(),
            client: LocalizedText::default(),
            location: LocalizedText::default(),
            gallery: Vec::new(),
            completion_date: None,
            tags: LocalizedTags::default(),
            featured: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        project.append_images(
            urls.iter()
                .map(|u| ProjectImage {
                    url: u.to_string(),
                    public_id: u.to_string(),
                    alt: String::new(),
                    is_main: false,
                    order: 99,
                })
                .collect(),
        );
        project
    }

    #[test]
    fn delete_renumbers_and_promotes_main() {
        let mut project = project_with(&["a", "b", "c"]);
        project.remove_image(0).unwrap();
        let view: Vec<(&str, u32, bool)> = project
            .gallery
            .iter()
            .map(|i| (i.url.as_str(), i.order, i.is_main))
            .collect();
        assert_eq!(view, vec![("b", 0, true), ("c", 1, false)]);
    }

    #[test]
    fn reorder_moves_listed_images_first() {
        let mut project = project_with(&["a", "b", "c"]);
        project.reorder_gallery(&["c".to_string(), "a".to_string()]);
        let urls: Vec<&str> = project.gallery.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["c", "a", "b"]);
        assert!(project.gallery[0].is_main);
        assert_eq!(project.gallery[2].order, 2);
    }
}
