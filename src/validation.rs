use thiserror::Error;

use crate::models::{AddressComponents, BatchItem};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub fn validate_project_id(project_id: &str) -> Result<(), ValidationError> {
    if project_id.trim().is_empty() {
        return Err(ValidationError::MissingParameter("projectId".to_string()));
    }

    if project_id.contains('/') {
        return Err(ValidationError::InvalidParameter(format!(
            "projectId must not contain '/': {}",
            project_id
        )));
    }

    Ok(())
}

pub fn validate_address(address: &AddressComponents) -> Result<(), ValidationError> {
    if address.address.trim().is_empty() {
        return Err(ValidationError::MissingParameter("address".to_string()));
    }

    Ok(())
}

pub fn validate_capture_request(
    project_id: &str,
    company_id: &str,
    address: &AddressComponents,
) -> Result<(), ValidationError> {
    validate_project_id(project_id)?;

    if company_id.trim().is_empty() {
        return Err(ValidationError::MissingParameter("companyId".to_string()));
    }

    validate_address(address)?;

    Ok(())
}

pub fn validate_batch_item(item: &BatchItem) -> Result<(), ValidationError> {
    validate_capture_request(&item.project_id, &item.company_id, &item.address)
}
