//! Resource names (`models/{id}`, `models/{id}/instances/{id}`) and their UID permalinks.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error::{Result, ServiceError};

static RESOURCE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,62}$").unwrap());

pub const MODEL_COLLECTION: &str = "models";
pub const INSTANCE_COLLECTION: &str = "instances";
pub const OPERATION_COLLECTION: &str = "operations";
pub const DEFINITION_COLLECTION: &str = "model-definitions";

pub fn is_valid_id(id: &str) -> bool {
    RESOURCE_ID.is_match(id)
}

pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ServiceError::InvalidArgument("id is required".to_owned()));
    }
    if !is_valid_id(id) {
        return Err(ServiceError::InvalidArgument(format!(
            "id {:?} must match {}",
            id,
            RESOURCE_ID.as_str()
        )));
    }
    Ok(())
}

pub fn model_name(id: &str) -> String {
    format!("{}/{}", MODEL_COLLECTION, id)
}

pub fn instance_name(model_id: &str, instance_id: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        MODEL_COLLECTION, model_id, INSTANCE_COLLECTION, instance_id
    )
}

pub fn model_permalink(uid: &Uuid) -> String {
    format!("{}/{}", MODEL_COLLECTION, uid)
}

pub fn instance_permalink(model_uid: &Uuid, instance_uid: &Uuid) -> String {
    format!(
        "{}/{}/{}/{}",
        MODEL_COLLECTION, model_uid, INSTANCE_COLLECTION, instance_uid
    )
}

pub fn operation_name(uid: &Uuid) -> String {
    format!("{}/{}", OPERATION_COLLECTION, uid)
}

/// Id of a `models/{id}` name.
pub fn parse_model_name(name: &str) -> Result<String> {
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [MODEL_COLLECTION, id] if is_valid_id(id) => Ok((*id).to_owned()),
        _ => Err(ServiceError::InvalidArgument(format!(
            "model name {:?} must have the format models/{{id}}",
            name
        ))),
    }
}

/// `(model_id, instance_id)` of a `models/{id}/instances/{id}` name.
pub fn parse_instance_name(name: &str) -> Result<(String, String)> {
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [MODEL_COLLECTION, model_id, INSTANCE_COLLECTION, instance_id]
            if is_valid_id(model_id) && is_valid_id(instance_id) =>
        {
            Ok(((*model_id).to_owned(), (*instance_id).to_owned()))
        }
        _ => Err(ServiceError::InvalidArgument(format!(
            "instance name {:?} must have the format models/{{id}}/instances/{{id}}",
            name
        ))),
    }
}

fn parse_uid(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        ServiceError::InvalidArgument(format!("{} {:?} is not a valid uid", what, value))
    })
}

/// Model UID of a `models/{uid}` permalink.
pub fn parse_model_permalink(permalink: &str) -> Result<Uuid> {
    match permalink.split('/').collect::<Vec<_>>().as_slice() {
        [MODEL_COLLECTION, uid] => parse_uid(uid, "model"),
        _ => Err(ServiceError::InvalidArgument(format!(
            "model permalink {:?} must have the format models/{{uid}}",
            permalink
        ))),
    }
}

/// `(model_uid, instance_uid)` of a `models/{uid}/instances/{uid}` permalink.
pub fn parse_instance_permalink(permalink: &str) -> Result<(Uuid, Uuid)> {
    match permalink.split('/').collect::<Vec<_>>().as_slice() {
        [MODEL_COLLECTION, model_uid, INSTANCE_COLLECTION, instance_uid] => Ok((
            parse_uid(model_uid, "model")?,
            parse_uid(instance_uid, "instance")?,
        )),
        _ => Err(ServiceError::InvalidArgument(format!(
            "instance permalink {:?} must have the format models/{{uid}}/instances/{{uid}}",
            permalink
        ))),
    }
}

/// Operation UID of an `operations/{uid}` name.
pub fn parse_operation_name(name: &str) -> Result<Uuid> {
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [OPERATION_COLLECTION, uid] => parse_uid(uid, "operation"),
        _ => Err(ServiceError::InvalidArgument(format!(
            "operation name {:?} must have the format operations/{{uid}}",
            name
        ))),
    }
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use super::*;
    use crate::error::Code;

    #[test]
    pub fn model_names() {
        assert_eq!(parse_model_name("models/abc1234567").unwrap(), "abc1234567");
        assert_eq!(model_name("abc1234567"), "models/abc1234567");

        for bad in ["abc1234567", "model/abc", "models/", "models/a/b", "models/-abc", ""] {
            let err = parse_model_name(bad).unwrap_err();
            assert_eq!(err.code(), Code::InvalidArgument, "{}", bad);
        }
    }

    #[test]
    pub fn instance_names() {
        assert_eq!(
            parse_instance_name("models/m1/instances/v1.0-cpu").unwrap(),
            ("m1".to_owned(), "v1.0-cpu".to_owned())
        );
        assert!(parse_instance_name("models/m1/versions/latest").is_err());
        assert!(parse_instance_name("models/m1").is_err());
    }

    #[test]
    pub fn permalinks() {
        let model_uid = Uuid::new_v4();
        let instance_uid = Uuid::new_v4();

        assert_eq!(
            parse_model_permalink(&model_permalink(&model_uid)).unwrap(),
            model_uid
        );
        assert_eq!(
            parse_instance_permalink(&instance_permalink(&model_uid, &instance_uid)).unwrap(),
            (model_uid, instance_uid)
        );

        assert_eq!(
            parse_model_permalink("models/non-existed").unwrap_err().code(),
            Code::InvalidArgument
        );
        assert_eq!(
            parse_instance_permalink(&format!("models/{}/instances/non-existed", model_uid))
                .unwrap_err()
                .code(),
            Code::InvalidArgument
        );
    }

    #[test]
    pub fn ids() {
        assert!(validate_id("abc1234567").is_ok());
        assert!(validate_id("latest").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("has space").is_err());
        assert!(validate_id(&"a".repeat(64)).is_err());
    }
}
