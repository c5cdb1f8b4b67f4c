use tracing::info;

use crate::error::StoreError;
use crate::models::Employee;
use crate::store::{select_as, RemoteStore, Table};

pub async fn fetch_employees(store: &dyn RemoteStore) -> Result<Vec<Employee>, StoreError> {
    let employees: Vec<Employee> = select_as(store, Table::Employees, "*").await?;
    info!("Fetched {} employees", employees.len());
    Ok(employees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn lists_demo_staff() {
        let store = MemoryStore::demo();
        let employees = fetch_employees(&store).await.unwrap();
        assert_eq!(employees.len(), 3);
        assert_eq!(employees[0].full_name(), "Anne Holm");
    }
}
