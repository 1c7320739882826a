//! Static company attributes
//!
//! One profile per company per snapshot. Every attribute is optional; the
//! feature composer imputes gaps from the configured imputation policy.

use serde::{Deserialize, Serialize};

use crate::CompanyId;

/// Financial attributes (euros)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialAttrs {
    pub ca_consolide: Option<f64>,
    pub ca_groupe: Option<f64>,
    pub ca_bilan: Option<f64>,
    pub resultat_exploitation: Option<f64>,
    pub resultat_net: Option<f64>,
    pub fonds_propres: Option<f64>,
}

/// Headcount attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkforceAttrs {
    pub effectif: Option<f64>,
    pub effectif_consolide: Option<f64>,
    pub effectif_groupe: Option<f64>,
}

/// Legal and group structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureAttrs {
    pub nb_etab_secondaire: Option<u32>,
    pub nb_marques: Option<u32>,
    pub nb_actionnaires: Option<u32>,
    pub has_group_owner: Option<bool>,
    pub has_etab_secondaire: Option<bool>,
}

/// Contact presence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactFlags {
    pub nb_contacts: Option<u32>,
    pub has_email: Option<bool>,
    pub has_phone: Option<bool>,
    pub has_website: Option<bool>,
    pub has_linkedin: Option<bool>,
    pub has_facebook: Option<bool>,
    pub has_twitter: Option<bool>,
}

/// Business classification flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationFlags {
    pub startup: Option<bool>,
    pub b2b: Option<bool>,
    pub b2c: Option<bool>,
    pub has_brevets: Option<bool>,
    pub has_bodacc: Option<bool>,
    pub radiee: Option<bool>,
}

/// Company attribute record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub company_id: CompanyId,
    #[serde(default)]
    pub financial: FinancialAttrs,
    #[serde(default)]
    pub workforce: WorkforceAttrs,
    #[serde(default)]
    pub structure: StructureAttrs,
    #[serde(default)]
    pub contact: ContactFlags,
    #[serde(default)]
    pub classification: ClassificationFlags,
}

impl CompanyProfile {
    /// A profile with every attribute missing
    pub fn empty(company_id: &str) -> Self {
        Self {
            company_id: company_id.to_string(),
            financial: FinancialAttrs::default(),
            workforce: WorkforceAttrs::default(),
            structure: StructureAttrs::default(),
            contact: ContactFlags::default(),
            classification: ClassificationFlags::default(),
        }
    }

    /// Numeric value of one attribute; booleans encode as 0/1
    pub fn attribute(&self, field: AttributeField) -> Option<f64> {
        use AttributeField::*;

        fn flag(v: Option<bool>) -> Option<f64> {
            v.map(|b| if b { 1.0 } else { 0.0 })
        }
        fn count(v: Option<u32>) -> Option<f64> {
            v.map(f64::from)
        }

        let f = &self.financial;
        let w = &self.workforce;
        let s = &self.structure;
        let c = &self.contact;
        let k = &self.classification;

        let value = match field {
            CaConsolide => f.ca_consolide,
            CaGroupe => f.ca_groupe,
            CaBilan => f.ca_bilan,
            ResultatExploitation => f.resultat_exploitation,
            ResultatNet => f.resultat_net,
            FondsPropres => f.fonds_propres,
            Effectif => w.effectif,
            EffectifConsolide => w.effectif_consolide,
            EffectifGroupe => w.effectif_groupe,
            NbEtabSecondaire => count(s.nb_etab_secondaire),
            NbMarques => count(s.nb_marques),
            NbActionnaires => count(s.nb_actionnaires),
            HasGroupOwner => flag(s.has_group_owner),
            HasEtabSecondaire => flag(s.has_etab_secondaire),
            NbContacts => count(c.nb_contacts),
            HasEmail => flag(c.has_email),
            HasPhone => flag(c.has_phone),
            HasWebsite => flag(c.has_website),
            HasLinkedin => flag(c.has_linkedin),
            HasFacebook => flag(c.has_facebook),
            HasTwitter => flag(c.has_twitter),
            Startup => flag(k.startup),
            B2b => flag(k.b2b),
            B2c => flag(k.b2c),
            HasBrevets => flag(k.has_brevets),
            HasBodacc => flag(k.has_bodacc),
            Radiee => flag(k.radiee),
        };

        // NaN counts as missing
        value.filter(|v| v.is_finite())
    }
}

/// Attribute group, used as feature-name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeGroup {
    Financial,
    Workforce,
    Structure,
    Contact,
    Classification,
}

impl AttributeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeGroup::Financial => "financial",
            AttributeGroup::Workforce => "workforce",
            AttributeGroup::Structure => "structure",
            AttributeGroup::Contact => "contact",
            AttributeGroup::Classification => "classification",
        }
    }
}

/// Every attribute that becomes a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeField {
    CaConsolide,
    CaGroupe,
    CaBilan,
    ResultatExploitation,
    ResultatNet,
    FondsPropres,
    Effectif,
    EffectifConsolide,
    EffectifGroupe,
    NbEtabSecondaire,
    NbMarques,
    NbActionnaires,
    HasGroupOwner,
    HasEtabSecondaire,
    NbContacts,
    HasEmail,
    HasPhone,
    HasWebsite,
    HasLinkedin,
    HasFacebook,
    HasTwitter,
    Startup,
    B2b,
    B2c,
    HasBrevets,
    HasBodacc,
    Radiee,
}

impl AttributeField {
    /// Schema order
    pub const ALL: [AttributeField; 27] = [
        AttributeField::CaConsolide,
        AttributeField::CaGroupe,
        AttributeField::CaBilan,
        AttributeField::ResultatExploitation,
        AttributeField::ResultatNet,
        AttributeField::FondsPropres,
        AttributeField::Effectif,
        AttributeField::EffectifConsolide,
        AttributeField::EffectifGroupe,
        AttributeField::NbEtabSecondaire,
        AttributeField::NbMarques,
        AttributeField::NbActionnaires,
        AttributeField::HasGroupOwner,
        AttributeField::HasEtabSecondaire,
        AttributeField::NbContacts,
        AttributeField::HasEmail,
        AttributeField::HasPhone,
        AttributeField::HasWebsite,
        AttributeField::HasLinkedin,
        AttributeField::HasFacebook,
        AttributeField::HasTwitter,
        AttributeField::Startup,
        AttributeField::B2b,
        AttributeField::B2c,
        AttributeField::HasBrevets,
        AttributeField::HasBodacc,
        AttributeField::Radiee,
    ];

    pub fn group(&self) -> AttributeGroup {
        use AttributeField::*;
        match self {
            CaConsolide | CaGroupe | CaBilan | ResultatExploitation | ResultatNet
            | FondsPropres => AttributeGroup::Financial,
            Effectif | EffectifConsolide | EffectifGroupe => AttributeGroup::Workforce,
            NbEtabSecondaire | NbMarques | NbActionnaires | HasGroupOwner
            | HasEtabSecondaire => AttributeGroup::Structure,
            NbContacts | HasEmail | HasPhone | HasWebsite | HasLinkedin | HasFacebook
            | HasTwitter => AttributeGroup::Contact,
            Startup | B2b | B2c | HasBrevets | HasBodacc | Radiee => {
                AttributeGroup::Classification
            }
        }
    }

    pub fn field_name(&self) -> &'static str {
        use AttributeField::*;
        match self {
            CaConsolide => "ca_consolide",
            CaGroupe => "ca_groupe",
            CaBilan => "ca_bilan",
            ResultatExploitation => "resultat_exploitation",
            ResultatNet => "resultat_net",
            FondsPropres => "fonds_propres",
            Effectif => "effectif",
            EffectifConsolide => "effectif_consolide",
            EffectifGroupe => "effectif_groupe",
            NbEtabSecondaire => "nb_etab_secondaire",
            NbMarques => "nb_marques",
            NbActionnaires => "nb_actionnaires",
            HasGroupOwner => "has_group_owner",
            HasEtabSecondaire => "has_etab_secondaire",
            NbContacts => "nb_contacts",
            HasEmail => "has_email",
            HasPhone => "has_phone",
            HasWebsite => "has_website",
            HasLinkedin => "has_linkedin",
            HasFacebook => "has_facebook",
            HasTwitter => "has_twitter",
            Startup => "startup",
            B2b => "b2b",
            B2c => "b2c",
            HasBrevets => "has_brevets",
            HasBodacc => "has_bodacc",
            Radiee => "radiee",
        }
    }

    /// Feature name, e.g. `financial.ca_consolide`
    pub fn feature_name(&self) -> String {
        format!("{}.{}", self.group().as_str(), self.field_name())
    }

    pub fn from_feature_name(name: &str) -> Option<AttributeField> {
        Self::ALL.iter().copied().find(|f| f.feature_name() == name)
    }
}
