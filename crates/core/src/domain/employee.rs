use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "full_availability")]
    pub availability_percent: u8,
    pub hourly_rate: Decimal,
    /// Count of deals the employee is currently staffed on. Used as the
    /// second-order tie-break when ranking skill matches.
    #[serde(default)]
    pub active_deal_load: u32,
}

fn full_availability() -> u8 {
    100
}

/// An employee assigned to a specific deal's delivery team.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamAssignment {
    pub employee: Employee,
    pub role_on_deal: String,
    pub allocation_percent: u8,
    #[serde(default)]
    pub assigned_by: Option<String>,
}

impl TeamAssignment {
    /// Estimated monthly cost for this assignment at a 160 hour month,
    /// prorated by allocation.
    pub fn monthly_cost(&self) -> Decimal {
        self.employee.hourly_rate * Decimal::from(160u32) * Decimal::from(self.allocation_percent)
            / Decimal::from(100u32)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Employee, EmployeeId, TeamAssignment};

    #[test]
    fn monthly_cost_prorates_by_allocation() {
        let assignment = TeamAssignment {
            employee: Employee {
                id: EmployeeId("emp-1".to_string()),
                name: "Ana".to_string(),
                role: "Engineer".to_string(),
                department: None,
                skills: vec![],
                availability_percent: 100,
                hourly_rate: Decimal::new(10000, 2),
                active_deal_load: 0,
            },
            role_on_deal: "Lead".to_string(),
            allocation_percent: 50,
            assigned_by: None,
        };

        // 100/hr * 160h * 50% = 8000
        assert_eq!(assignment.monthly_cost(), Decimal::new(800000, 2));
    }
}
