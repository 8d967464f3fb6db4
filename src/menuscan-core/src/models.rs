use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Restaurant is the top-level synthetic record stored in the collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub restaurant_name: String,
    pub restaurant_id: String,
    pub meta_data: Metadata,
    pub address: Address,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default)]
    pub chefs: Vec<Chef>,
    #[serde(default)]
    pub menu: Vec<MenuItem>,
}

impl Restaurant {
    /// The chef flagged as head chef, if any
    pub fn head_chef(&self) -> Option<&Chef> {
        self.chefs.iter().find(|c| c.is_head_chef)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(rename = "type")]
    pub kind: String,
    /// Opening and closing hour, 24h clock
    #[serde(default)]
    pub operating_hours: Vec<i32>,
    pub phone_number: String,
    pub email: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address_id: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub owner_id: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chef {
    pub chef_id: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub is_head_chef: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub dish_name: String,
    pub price: Price,
}

/// Price split into whole and fractional currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub dollars: i32,
    pub cents: i32,
}

/// InstallMode selects between the full dataset and a small dummy dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    Full,
    Dummy,
}

impl FromStr for InstallMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "dummy" => Ok(Self::Dummy),
            other => Err(format!("Invalid install mode '{}': expected full or dummy", other)),
        }
    }
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Dummy => f.write_str("dummy"),
        }
    }
}

/// InstallRequest is the body of POST /run-install
///
/// `install` stays a raw string so the handler can tell a missing mode
/// apart from an unknown one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    #[serde(default)]
    pub install: String,
    #[serde(default)]
    pub load_indexes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_count: Option<i64>,
}

/// StatusResponse is the health and install payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub code: u16,
    pub title: String,
    pub message: String,
}

/// Status is the envelope header of every query response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: u16,
    pub message: String,
}

/// RestaurantResponse wraps query results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantResponse {
    pub status: Status,
    pub response: Vec<Restaurant>,
}

pub const NOT_FOUND_MESSAGE: &str = "No restaurant was found!";

impl RestaurantResponse {
    /// Build the envelope; an empty result is a normal outcome, not an error
    pub fn from_results(results: Vec<Restaurant>) -> Self {
        let message = if results.is_empty() {
            NOT_FOUND_MESSAGE.to_string()
        } else {
            format!("Found {} restaurant(s)", results.len())
        };

        Self {
            status: Status { code: 200, message },
            response: results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restaurant_uses_camel_case_keys() {
        let restaurant = Restaurant {
            restaurant_name: "Restaurant ABC".to_string(),
            restaurant_id: "id-1".to_string(),
            meta_data: Metadata {
                kind: "DINER".to_string(),
                operating_hours: vec![9, 21],
                phone_number: "555-0100".to_string(),
                email: "abc@example.com".to_string(),
                is_active: true,
            },
            address: Address {
                address_id: "addr-1".to_string(),
                city: "CITY A".to_string(),
                state: "STATE A".to_string(),
                zip: "00001".to_string(),
                country: "COUNTRY A".to_string(),
            },
            owners: vec![],
            chefs: vec![Chef {
                chef_id: "chef-1".to_string(),
                first_name: "AB".to_string(),
                last_name: "CD".to_string(),
                dob: "00-00-0000".to_string(),
                is_head_chef: true,
            }],
            menu: vec![MenuItem {
                kind: "DISH".to_string(),
                dish_name: "DISH NUMBER 1".to_string(),
                price: Price {
                    dollars: 1,
                    cents: 99,
                },
            }],
        };

        let json = serde_json::to_value(&restaurant).unwrap();
        assert_eq!(json["restaurantId"], "id-1");
        assert_eq!(json["metaData"]["type"], "DINER");
        assert_eq!(json["metaData"]["isActive"], true);
        assert_eq!(json["address"]["country"], "COUNTRY A");
        assert_eq!(json["chefs"][0]["isHeadChef"], true);
        assert_eq!(json["menu"][0]["price"]["cents"], 99);
        assert_eq!(restaurant.head_chef().unwrap().chef_id, "chef-1");
    }

    #[test]
    fn test_install_mode_parsing() {
        assert_eq!("full".parse::<InstallMode>(), Ok(InstallMode::Full));
        assert_eq!("dummy".parse::<InstallMode>(), Ok(InstallMode::Dummy));
        assert!("FULL".parse::<InstallMode>().is_err());
        assert!("".parse::<InstallMode>().is_err());
    }

    #[test]
    fn test_install_request_defaults() {
        let req: InstallRequest = serde_json::from_str(r#"{"install":"dummy"}"#).unwrap();
        assert_eq!(req.install, "dummy");
        assert!(!req.load_indexes);
        assert_eq!(req.document_count, None);

        let req: InstallRequest =
            serde_json::from_str(r#"{"install":"full","loadIndexes":true,"documentCount":20000}"#)
                .unwrap();
        assert!(req.load_indexes);
        assert_eq!(req.document_count, Some(20000));
    }

    #[test]
    fn test_empty_results_report_not_found() {
        let res = RestaurantResponse::from_results(vec![]);
        assert_eq!(res.status.code, 200);
        assert_eq!(res.status.message, NOT_FOUND_MESSAGE);
        assert!(res.response.is_empty());
    }
}
