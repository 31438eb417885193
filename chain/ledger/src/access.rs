//! Operator access control
//!
//! Only registered operators may issue `validate` and `mark_processed`.
//! The admin registers operators and is an operator itself.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct OperatorSet {
    admin: String,
    operators: HashSet<String>,
}

impl OperatorSet {
    /// Create access control with an initial admin.
    pub fn new(admin: impl Into<String>) -> Self {
        let admin = admin.into();
        let mut operators = HashSet::new();
        operators.insert(admin.clone());
        Self { admin, operators }
    }

    pub fn is_operator(&self, caller: &str) -> bool {
        self.operators.contains(caller)
    }

    pub fn is_admin(&self, caller: &str) -> bool {
        self.admin == caller
    }

    /// Register an operator. Only admin can grant.
    pub fn grant(&mut self, admin_caller: &str, operator: impl Into<String>) -> bool {
        if !self.is_admin(admin_caller) {
            return false;
        }
        self.operators.insert(operator.into());
        true
    }
}
