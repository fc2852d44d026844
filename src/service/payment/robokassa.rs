use rand::Rng;
use std::{collections::HashMap, fmt};
use url::Url;

use crate::{config::RobokassaConfig, service::plan::Plan};

use super::{
    error::PaymentError,
    signature::{checkout_signature, result_signature, signatures_match, HashAlgorithm, CUSTOM_PARAM_PREFIX},
};

pub const USER_ID_PARAM: &str = "Shp_userId";
pub const PLAN_ID_PARAM: &str = "Shp_planId";

/// Plain-text answer to the result callback. Robokassa only understands `OK<InvId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobokassaReply {
    Ok(String),
    Fail,
}

impl RobokassaReply {
    pub fn is_ok(&self) -> bool {
        matches!(self, RobokassaReply::Ok(_))
    }
}

impl fmt::Display for RobokassaReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobokassaReply::Ok(inv_id) => write!(f, "OK{}", inv_id),
            RobokassaReply::Fail => write!(f, "FAIL"),
        }
    }
}

/// Parameters of a result callback, taken from either the form body or the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultNotification {
    pub out_sum: String,
    pub inv_id: String,
    pub signature: String,
    /// Every `Shp_` parameter exactly as received, since all of them are signed.
    pub custom: Vec<(String, String)>,
}

impl ResultNotification {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, PaymentError> {
        let field = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| PaymentError::InvalidRequest(format!("Missing {}", name)))
        };

        let custom = params
            .iter()
            .filter(|(key, _)| {
                key.len() > CUSTOM_PARAM_PREFIX.len()
                    && key
                        .get(..CUSTOM_PARAM_PREFIX.len())
                        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CUSTOM_PARAM_PREFIX))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            out_sum: field("OutSum")?,
            inv_id: field("InvId")?,
            signature: field("SignatureValue")?,
            custom,
        })
    }

    pub fn custom_param(&self, name: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
    }

    pub fn user_id(&self) -> Result<i64, PaymentError> {
        let raw = self
            .custom_param(USER_ID_PARAM)
            .ok_or_else(|| PaymentError::InvalidRequest(format!("Missing {}", USER_ID_PARAM)))?;
        raw.parse()
            .map_err(|_| PaymentError::InvalidRequest(format!("Invalid {}: {}", USER_ID_PARAM, raw)))
    }

    pub fn plan_id(&self) -> Result<&str, PaymentError> {
        self.custom_param(PLAN_ID_PARAM)
            .filter(|plan_id| !plan_id.is_empty())
            .ok_or_else(|| PaymentError::InvalidRequest(format!("Missing {}", PLAN_ID_PARAM)))
    }

    /// Invoice ids are drawn at random, so the key also carries the signed user and plan.
    /// Robokassa sends `InvId=0` when the shop let it pick the number, so those cannot be deduplicated.
    pub fn event_key(&self, user_id: i64, plan_id: &str) -> Option<String> {
        match self.inv_id.parse::<u64>() {
            Ok(0) => None,
            _ => Some(format!("robokassa:{}:{}:{}", self.inv_id, user_id, plan_id)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RobokassaGateway {
    config: RobokassaConfig,
}

impl RobokassaGateway {
    pub fn new(config: RobokassaConfig) -> Self {
        Self { config }
    }

    pub fn verify_result(&self, notification: &ResultNotification) -> Result<(), PaymentError> {
        let password2 = self
            .config
            .password2
            .as_deref()
            .ok_or(PaymentError::NotConfigured("Robokassa"))?;

        let expected = result_signature(
            self.config.hash_algorithm,
            &notification.out_sum,
            &notification.inv_id,
            password2,
            &notification.custom,
        );

        if signatures_match(&expected, &notification.signature) {
            Ok(())
        } else {
            Err(PaymentError::InvalidSignature(notification.inv_id.clone()))
        }
    }

    pub fn new_invoice_id() -> u32 {
        rand::thread_rng().gen_range(1..i32::MAX as u32)
    }

    pub fn payment_url(&self, user_id: i64, plan: &Plan, inv_id: u32) -> Result<String, PaymentError> {
        let (merchant_login, password1) = match (&self.config.merchant_login, &self.config.password1) {
            (Some(login), Some(password)) => (login.as_str(), password.as_str()),
            _ => return Err(PaymentError::NotConfigured("Robokassa checkout")),
        };

        let out_sum = plan.price_string();
        let inv_id = inv_id.to_string();
        let custom = vec![
            (PLAN_ID_PARAM.to_string(), plan.id.to_string()),
            (USER_ID_PARAM.to_string(), user_id.to_string()),
        ];
        let signature = checkout_signature(
            self.config.hash_algorithm,
            merchant_login,
            &out_sum,
            &inv_id,
            password1,
            &custom,
        );

        let mut params = vec![
            ("MerchantLogin".to_string(), merchant_login.to_string()),
            ("OutSum".to_string(), out_sum),
            ("InvId".to_string(), inv_id),
            ("Description".to_string(), plan.description.to_string()),
            ("SignatureValue".to_string(), signature),
        ];
        if self.config.hash_algorithm != HashAlgorithm::Md5 {
            params.push(("SignatureAlgorithm".to_string(), self.config.hash_algorithm.to_string()));
        }
        if self.config.test_mode {
            params.push(("IsTest".to_string(), "1".to_string()));
        }
        params.extend(custom);

        let url = Url::parse_with_params(&self.config.payment_url, &params)
            .map_err(|e| PaymentError::InvalidRequest(format!("Invalid payment URL: {}", e)))?;
        Ok(url.to_string())
    }
}
