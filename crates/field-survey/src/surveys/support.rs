use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::repository::{RepositoryError, SettingsStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfficeAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfficeHours {
    pub monday_to_friday: Option<String>,
    pub saturday: Option<String>,
    pub sunday: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialLinks {
    pub website: Option<String>,
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// Contact details shown on the help page. One record exists per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportSettings {
    pub support_email: Option<String>,
    pub support_phone: Option<String>,
    pub whatsapp_number: Option<String>,
    pub office_address: OfficeAddress,
    pub office_hours: OfficeHours,
    pub social_links: SocialLinks,
    pub faqs: Vec<Faq>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupportSettings {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            support_email: None,
            support_phone: None,
            whatsapp_number: None,
            office_address: OfficeAddress::default(),
            office_hours: OfficeHours::default(),
            social_links: SocialLinks::default(),
            faqs: Vec::new(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields an admin may replace. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportPatch {
    pub support_email: Option<String>,
    pub support_phone: Option<String>,
    pub whatsapp_number: Option<String>,
    pub office_address: Option<OfficeAddress>,
    pub office_hours: Option<OfficeHours>,
    pub social_links: Option<SocialLinks>,
    pub faqs: Option<Vec<Faq>>,
}

impl SupportPatch {
    fn apply(self, settings: &mut SupportSettings) {
        if let Some(email) = self.support_email {
            settings.support_email = Some(email);
        }
        if let Some(phone) = self.support_phone {
            settings.support_phone = Some(phone);
        }
        if let Some(number) = self.whatsapp_number {
            settings.whatsapp_number = Some(number);
        }
        if let Some(address) = self.office_address {
            settings.office_address = address;
        }
        if let Some(hours) = self.office_hours {
            settings.office_hours = hours;
        }
        if let Some(links) = self.social_links {
            settings.social_links = links;
        }
        if let Some(faqs) = self.faqs {
            settings.faqs = faqs;
        }
    }
}

/// Get-or-create access to the support settings record.
pub struct SupportDesk<T> {
    store: Arc<T>,
}

impl<T> SupportDesk<T>
where
    T: SettingsStore + 'static,
{
    pub fn new(store: Arc<T>) -> Self {
        Self { store }
    }

    pub fn current(&self) -> Result<SupportSettings, RepositoryError> {
        if let Some(settings) = self.store.load()? {
            return Ok(settings);
        }
        let settings = SupportSettings::empty(Utc::now());
        self.store.save(settings.clone())?;
        Ok(settings)
    }

    pub fn update(
        &self,
        patch: SupportPatch,
        admin: &str,
    ) -> Result<SupportSettings, RepositoryError> {
        let mut settings = self.current()?;
        patch.apply(&mut settings);
        settings.updated_by = Some(admin.to_string());
        settings.updated_at = Utc::now();
        self.store.save(settings.clone())?;
        info!(admin = admin, "support settings updated");
        Ok(settings)
    }
}
