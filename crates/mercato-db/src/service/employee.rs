//! Staff records. Sales employees are the owners of commission rows.

use std::sync::Arc;

use tracing::{info, warn};

use mercato_core::validation::{validate_employee_code, validate_phone, validate_text};
use mercato_core::Employee;

use super::error::{EngineError, EngineResult};
use super::EngineState;
use crate::pool::commit;
use crate::repository::employee;

const MAX_NAME_LEN: usize = 50;
const CODE_ATTEMPTS: usize = 20;

pub struct EmployeeService {
    state: Arc<EngineState>,
}

impl EmployeeService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        EmployeeService { state }
    }

    /// Creates an employee under a fresh random five-digit code.
    pub async fn create_employee(&self, name: &str, phone: &str, is_sales: bool) -> EngineResult<Employee> {
        let name = validate_text("name", name, MAX_NAME_LEN)?;
        let phone = validate_phone(phone)?;
        let mut tx = self.state.db.begin().await?;

        if employee::phone_exists(&mut tx, &phone).await? {
            return Err(EngineError::Conflict(format!("phone {phone} is already registered")));
        }

        let mut code = None;
        for _ in 0..CODE_ATTEMPTS {
            let candidate = format!("{:05}", 10_000 + self.state.ports.random.next_below(90_000));
            if !employee::code_exists(&mut tx, &candidate).await? {
                code = Some(candidate);
                break;
            }
        }
        let Some(code) = code else {
            warn!(attempts = CODE_ATTEMPTS, "No free employee code found");
            return Err(EngineError::Conflict("could not allocate an employee code".to_string()));
        };

        let id = employee::insert(&mut tx, &code, &name, &phone, is_sales, self.state.now()).await?;
        let created = employee::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("Employee", id))?;
        commit(tx).await?;

        info!(employee_id = id, employee_code = %code, is_sales, "Employee created");
        Ok(created)
    }

    pub async fn get_by_code(&self, employee_code: &str) -> EngineResult<Employee> {
        validate_employee_code(employee_code)?;
        let mut conn = self.state.db.acquire().await?;
        employee::fetch_by_code(&mut conn, employee_code)
            .await?
            .ok_or_else(|| EngineError::not_found("Employee", employee_code))
    }

    pub async fn list_employees(&self, sales_only: bool) -> EngineResult<Vec<Employee>> {
        let mut conn = self.state.db.acquire().await?;
        Ok(employee::list(&mut conn, sales_only).await?)
    }
}
