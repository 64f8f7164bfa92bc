//! Singleton settings documents: site-wide configuration and the homepage
//! featured-product set.
//!
//! Both are stored in the `settings` table under a constant key. The
//! storage envelope (`Singleton<T>`) carries identity, the optimistic
//! version and audit stamps; the document types here hold the payload and
//! their pure invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A document persisted as one row of the `settings` table.
pub trait SingletonDocument:
    Serialize + serde::de::DeserializeOwned + Default + Clone + Send + Sync + Unpin + 'static
{
    /// Constant primary key of the row.
    const KEY: &'static str;
}

/// Stored singleton with its envelope fields.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Singleton<T> {
    pub id: Uuid,
    /// Optimistic concurrency counter, bumped on every write.
    pub revision: i64,
    pub last_modified_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub document: T,
}

/// Loose `local@domain.tld` check.
pub fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !local.is_empty() && !host.is_empty() && !tld.is_empty() && !domain.contains('@')
}

// ---------------------------------------------------------------------------
// Site settings
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyAddress {
    pub street: String,
    pub city: String,
    pub country: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    pub weekdays: String,
    pub saturday: String,
    pub sunday: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialMedia {
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub linkedin: Option<String>,
    pub youtube: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub email_from: Option<String>,
    pub email_from_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notifications {
    pub email_on_new_contact: bool,
    pub email_on_new_order: bool,
    pub sms_notifications: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSettings {
    pub company_email: String,
    pub company_phone: String,
    pub company_phone_technical: String,
    pub company_address: CompanyAddress,
    pub working_hours: WorkingHours,
    pub social_media: SocialMedia,
    pub email_settings: EmailSettings,
    pub site_title: String,
    pub site_description: String,
    pub site_keywords: String,
    pub google_analytics_id: Option<String>,
    pub facebook_pixel_id: Option<String>,
    pub privacy_policy: Option<String>,
    pub terms_of_service: Option<String>,
    pub cookie_policy: Option<String>,
    pub notifications: Notifications,
    pub version: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            company_email: "constructions@mtc.co.rs".into(),
            company_phone: "+381 062 213 492".into(),
            company_phone_technical: "+381 065 94 88 576".into(),
            company_address: CompanyAddress {
                street: "Gandijeva 235/13".into(),
                city: "11073 Beograd".into(),
                country: "Srbija".into(),
            },
            working_hours: WorkingHours {
                weekdays: "Ponedeljak-Petak: 08:00-16:00".into(),
                saturday: "Subota: Zatvoreno".into(),
                sunday: "Nedelja: Zatvoreno".into(),
            },
            social_media: SocialMedia::default(),
            email_settings: EmailSettings {
                smtp_host: None,
                smtp_port: None,
                smtp_user: None,
                smtp_pass: None,
                email_from: None,
                email_from_name: "Nissal Tim".into(),
            },
            site_title: "NISSAL - Aluminijumski sistemi".into(),
            site_description:
                "Specijalizovani za proizvodnju i ugradnju aluminijumskih sistema najvećeg kvaliteta"
                    .into(),
            site_keywords: "aluminijum, sistemi, prozori, vrata, fasade, Beograd, Srbija".into(),
            google_analytics_id: None,
            facebook_pixel_id: None,
            privacy_policy: None,
            terms_of_service: None,
            cookie_policy: None,
            notifications: Notifications {
                email_on_new_contact: true,
                email_on_new_order: true,
                sms_notifications: false,
            },
            version: "1.0.0".into(),
        }
    }
}

impl SingletonDocument for SiteSettings {
    const KEY: &'static str = "site";
}

/// Fields visible to anonymous visitors.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicSiteSettings {
    pub company_email: String,
    pub company_phone: String,
    pub company_phone_technical: String,
    pub company_address: CompanyAddress,
    pub working_hours: WorkingHours,
    pub social_media: SocialMedia,
    pub site_title: String,
    pub site_description: String,
    pub site_keywords: String,
    pub google_analytics_id: Option<String>,
    pub facebook_pixel_id: Option<String>,
    pub version: String,
}

impl From<&SiteSettings> for PublicSiteSettings {
    fn from(s: &SiteSettings) -> Self {
        Self {
            company_email: s.company_email.clone(),
            company_phone: s.company_phone.clone(),
            company_phone_technical: s.company_phone_technical.clone(),
            company_address: s.company_address.clone(),
            working_hours: s.working_hours.clone(),
            social_media: s.social_media.clone(),
            site_title: s.site_title.clone(),
            site_description: s.site_description.clone(),
            site_keywords: s.site_keywords.clone(),
            google_analytics_id: s.google_analytics_id.clone(),
            facebook_pixel_id: s.facebook_pixel_id.clone(),
            version: s.version.clone(),
        }
    }
}

impl SiteSettings {
    /// Copy for admin views with the SMTP password masked.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if copy.email_settings.smtp_pass.is_some() {
            copy.email_settings.smtp_pass = Some("********".into());
        }
        copy
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddressPatch {
    pub street: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkingHoursPatch {
    pub weekdays: Option<String>,
    pub saturday: Option<String>,
    pub sunday: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SocialMediaPatch {
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub linkedin: Option<String>,
    pub youtube: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailSettingsPatch {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u32>,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub email_from: Option<String>,
    pub email_from_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotificationsPatch {
    pub email_on_new_contact: Option<bool>,
    pub email_on_new_order: Option<bool>,
    pub sms_notifications: Option<bool>,
}

/// General settings update. SMTP configuration goes through
/// [`EmailSettingsUpdate`] instead.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SiteSettingsPatch {
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub company_phone_technical: Option<String>,
    pub company_address: Option<AddressPatch>,
    pub working_hours: Option<WorkingHoursPatch>,
    pub social_media: Option<SocialMediaPatch>,
    pub site_title: Option<String>,
    pub site_description: Option<String>,
    pub site_keywords: Option<String>,
    pub google_analytics_id: Option<String>,
    pub facebook_pixel_id: Option<String>,
    pub privacy_policy: Option<String>,
    pub terms_of_service: Option<String>,
    pub cookie_policy: Option<String>,
    pub notifications: Option<NotificationsPatch>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactInfoPatch {
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub company_phone_technical: Option<String>,
    pub company_address: Option<AddressPatch>,
    pub working_hours: Option<WorkingHoursPatch>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailSettingsUpdate {
    pub email_settings: Option<EmailSettingsPatch>,
    pub notifications: Option<NotificationsPatch>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn check_email(field: &str, value: &Option<String>, errors: &mut Vec<String>) {
    if let Some(v) = value {
        if !looks_like_email(v) {
            errors.push(format!("{field} must be a valid email"));
        }
    }
}

fn check_len(
    field: &str,
    value: &Option<String>,
    min: usize,
    max: usize,
    errors: &mut Vec<String>,
) {
    if let Some(v) = value {
        let len = v.trim().chars().count();
        if len < min || len > max {
            errors.push(format!("{field} must be between {min} and {max} characters"));
        }
    }
}

impl AddressPatch {
    fn apply(self, target: &mut CompanyAddress) {
        set(&mut target.street, self.street);
        set(&mut target.city, self.city);
        set(&mut target.country, self.country);
    }
}

impl WorkingHoursPatch {
    fn apply(self, target: &mut WorkingHours) {
        set(&mut target.weekdays, self.weekdays);
        set(&mut target.saturday, self.saturday);
        set(&mut target.sunday, self.sunday);
    }
}

impl SocialMediaPatch {
    fn apply(self, target: &mut SocialMedia) {
        set_opt(&mut target.facebook, self.facebook);
        set_opt(&mut target.instagram, self.instagram);
        set_opt(&mut target.linkedin, self.linkedin);
        set_opt(&mut target.youtube, self.youtube);
    }
}

impl NotificationsPatch {
    fn apply(self, target: &mut Notifications) {
        set(&mut target.email_on_new_contact, self.email_on_new_contact);
        set(&mut target.email_on_new_order, self.email_on_new_order);
        set(&mut target.sms_notifications, self.sms_notifications);
    }
}

impl EmailSettingsPatch {
    fn validate(&self, errors: &mut Vec<String>) {
        check_len("emailSettings.smtpHost", &self.smtp_host, 3, 253, errors);
        if let Some(port) = self.smtp_port {
            if !(1..=65535).contains(&port) {
                errors.push("emailSettings.smtpPort must be between 1 and 65535".into());
            }
        }
        check_email("emailSettings.emailFrom", &self.email_from, errors);
    }

    fn apply(self, target: &mut EmailSettings) {
        set_opt(&mut target.smtp_host, self.smtp_host);
        // validated to fit in u16
        set_opt(
            &mut target.smtp_port,
            self.smtp_port.and_then(|p| u16::try_from(p).ok()),
        );
        set_opt(&mut target.smtp_user, self.smtp_user);
        set_opt(&mut target.smtp_pass, self.smtp_pass);
        set_opt(&mut target.email_from, self.email_from);
        set(&mut target.email_from_name, self.email_from_name);
    }
}

impl SiteSettingsPatch {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        check_email("companyEmail", &self.company_email, &mut errors);
        check_len("companyPhone", &self.company_phone, 5, 20, &mut errors);
        check_len("siteTitle", &self.site_title, 3, 100, &mut errors);
        check_len("siteDescription", &self.site_description, 0, 500, &mut errors);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn apply(self, target: &mut SiteSettings) {
        set(&mut target.company_email, self.company_email);
        set(&mut target.company_phone, self.company_phone);
        set(&mut target.company_phone_technical, self.company_phone_technical);
        if let Some(p) = self.company_address {
            p.apply(&mut target.company_address);
        }
        if let Some(p) = self.working_hours {
            p.apply(&mut target.working_hours);
        }
        if let Some(p) = self.social_media {
            p.apply(&mut target.social_media);
        }
        set(&mut target.site_title, self.site_title);
        set(&mut target.site_description, self.site_description);
        set(&mut target.site_keywords, self.site_keywords);
        set_opt(&mut target.google_analytics_id, self.google_analytics_id);
        set_opt(&mut target.facebook_pixel_id, self.facebook_pixel_id);
        set_opt(&mut target.privacy_policy, self.privacy_policy);
        set_opt(&mut target.terms_of_service, self.terms_of_service);
        set_opt(&mut target.cookie_policy, self.cookie_policy);
        if let Some(p) = self.notifications {
            p.apply(&mut target.notifications);
        }
    }
}

impl ContactInfoPatch {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        check_email("companyEmail", &self.company_email, &mut errors);
        check_len("companyPhone", &self.company_phone, 5, 20, &mut errors);
        check_len(
            "companyPhoneTechnical",
            &self.company_phone_technical,
            5,
            20,
            &mut errors,
        );
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn apply(self, target: &mut SiteSettings) {
        set(&mut target.company_email, self.company_email);
        set(&mut target.company_phone, self.company_phone);
        set(&mut target.company_phone_technical, self.company_phone_technical);
        if let Some(p) = self.company_address {
            p.apply(&mut target.company_address);
        }
        if let Some(p) = self.working_hours {
            p.apply(&mut target.working_hours);
        }
    }
}

impl EmailSettingsUpdate {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Some(p) = &self.email_settings {
            p.validate(&mut errors);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn apply(self, target: &mut SiteSettings) {
        if let Some(p) = self.email_settings {
            p.apply(&mut target.email_settings);
        }
        if let Some(p) = self.notifications {
            p.apply(&mut target.notifications);
        }
    }
}

// ---------------------------------------------------------------------------
// Homepage featured products
// ---------------------------------------------------------------------------

pub const MAX_FEATURED: usize = 4;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedEntry {
    pub product_id: Uuid,
    pub order: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HomepageSettings {
    #[serde(default)]
    pub featured_products: Vec<FeaturedEntry>,
}

impl SingletonDocument for HomepageSettings {
    const KEY: &'static str = "homepage";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurationError {
    #[error("Maximum 4 featured products allowed")]
    TooMany,
    #[error("Featured products must have unique order numbers")]
    DuplicateOrder,
    #[error("Each product can only be featured once")]
    DuplicateProduct,
    #[error("Order must be an integer between 1 and 4")]
    InvalidOrder,
    #[error("Product is already featured")]
    AlreadyFeatured,
    #[error("Order position {0} is already taken")]
    OrderTaken(i64),
    #[error("Product not found in featured products")]
    NotFeatured,
}

pub fn order_in_range(order: i64) -> bool {
    (1..=MAX_FEATURED as i64).contains(&order)
}

impl HomepageSettings {
    /// Check a complete featured set before it replaces the stored one.
    pub fn validate_entries(entries: &[FeaturedEntry]) -> Result<(), CurationError> {
        if entries.len() > MAX_FEATURED {
            return Err(CurationError::TooMany);
        }
        if entries.iter().any(|e| !order_in_range(e.order)) {
            return Err(CurationError::InvalidOrder);
        }
        for (i, entry) in entries.iter().enumerate() {
            let rest = &entries[i + 1..];
            if rest.iter().any(|e| e.order == entry.order) {
                return Err(CurationError::DuplicateOrder);
            }
            if rest.iter().any(|e| e.product_id == entry.product_id) {
                return Err(CurationError::DuplicateProduct);
            }
        }
        Ok(())
    }

    pub fn contains(&self, product_id: Uuid) -> bool {
        self.featured_products
            .iter()
            .any(|e| e.product_id == product_id)
    }

    /// Add a product at `order`, or at `count + 1` when no order is given.
    pub fn add(&mut self, product_id: Uuid, order: Option<i64>) -> Result<FeaturedEntry, CurationError> {
        if let Some(order) = order {
            if !order_in_range(order) {
                return Err(CurationError::InvalidOrder);
            }
        }
        if self.contains(product_id) {
            return Err(CurationError::AlreadyFeatured);
        }
        if self.featured_products.len() >= MAX_FEATURED {
            return Err(CurationError::TooMany);
        }
        let order = order.unwrap_or(self.featured_products.len() as i64 + 1);
        if self.featured_products.iter().any(|e| e.order == order) {
            return Err(CurationError::OrderTaken(order));
        }
        let entry = FeaturedEntry { product_id, order };
        self.featured_products.push(entry);
        Ok(entry)
    }

    /// Remove a product. Remaining orders are left as they are.
    pub fn remove(&mut self, product_id: Uuid) -> Result<FeaturedEntry, CurationError> {
        let pos = self
            .featured_products
            .iter()
            .position(|e| e.product_id == product_id)
            .ok_or(CurationError::NotFeatured)?;
        Ok(self.featured_products.remove(pos))
    }

    /// Entries sorted by ascending order.
    pub fn sorted(&self) -> Vec<FeaturedEntry> {
        let mut entries = self.featured_products.clone();
        entries.sort_by_key(|e| e.order);
        entries
    }
}
