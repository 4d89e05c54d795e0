//! Relationship-based authorization.
//!
//! [`authorize`] is a pure function of the actor and the operation. It never
//! touches shared state; callers load whatever rows the rule needs first and
//! pass them in. Each denial maps onto exactly one error kind: relations that
//! must stay hidden become `NotFound`, missing roles or ownership become
//! `Forbidden`.

use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Order;
use crate::models::user::{Actor, Role};

#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    ViewOrder(&'a Order),
    CreateOrder,
    AssignCourier(&'a Order),
    UpdateStatus(&'a Order),
    ReportPosition { order: &'a Order, courier_id: Uuid },
    ListCouriers,
    ListVendors,
    ManageAvailability,
}

impl Operation<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ViewOrder(_) => "view order",
            Operation::CreateOrder => "create order",
            Operation::AssignCourier(_) => "assign courier",
            Operation::UpdateStatus(_) => "update order status",
            Operation::ReportPosition { .. } => "report position",
            Operation::ListCouriers => "list couriers",
            Operation::ListVendors => "list vendors",
            Operation::ManageAvailability => "manage availability",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("role {role:?} may not {operation}")]
    RoleNotPermitted { role: Role, operation: &'static str },

    #[error("only the order's vendor may do this")]
    NotOrderVendor,

    #[error("only the order's vendor or assigned courier may do this")]
    NotOrderHandler,

    #[error("order not found")]
    NotParticipant,

    #[error("order not found or not assigned to you")]
    NotAssignedCourier,
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::RoleNotPermitted { .. } | Denial::NotOrderVendor | Denial::NotOrderHandler => {
                AppError::Forbidden(denial.to_string())
            }
            Denial::NotParticipant | Denial::NotAssignedCourier => {
                AppError::NotFound(denial.to_string())
            }
        }
    }
}

pub fn authorize(actor: &Actor, operation: Operation<'_>) -> Result<(), Denial> {
    let role_denied = Denial::RoleNotPermitted {
        role: actor.role,
        operation: operation.name(),
    };

    match operation {
        Operation::ViewOrder(order) => {
            let related = match actor.role {
                Role::Vendor => order.vendor_id == actor.id,
                Role::Customer => order.customer_id == actor.id,
                Role::Courier => order.courier_id == Some(actor.id),
            };
            related.then_some(()).ok_or(Denial::NotParticipant)
        }
        Operation::CreateOrder => match actor.role {
            Role::Vendor | Role::Customer => Ok(()),
            Role::Courier => Err(role_denied),
        },
        Operation::AssignCourier(order) => match actor.role {
            Role::Vendor if order.vendor_id == actor.id => Ok(()),
            Role::Vendor => Err(Denial::NotOrderVendor),
            Role::Courier | Role::Customer => Err(role_denied),
        },
        Operation::UpdateStatus(order) => match actor.role {
            Role::Vendor if order.vendor_id == actor.id => Ok(()),
            Role::Courier if order.courier_id == Some(actor.id) => Ok(()),
            Role::Vendor | Role::Courier => Err(Denial::NotOrderHandler),
            Role::Customer => Err(role_denied),
        },
        Operation::ReportPosition { order, courier_id } => match actor.role {
            Role::Courier if actor.id == courier_id && order.courier_id == Some(courier_id) => {
                Ok(())
            }
            Role::Courier => Err(Denial::NotAssignedCourier),
            Role::Vendor | Role::Customer => Err(role_denied),
        },
        Operation::ListCouriers => match actor.role {
            Role::Vendor => Ok(()),
            Role::Courier | Role::Customer => Err(role_denied),
        },
        Operation::ListVendors => match actor.role {
            Role::Customer => Ok(()),
            Role::Vendor | Role::Courier => Err(role_denied),
        },
        Operation::ManageAvailability => match actor.role {
            Role::Courier => Ok(()),
            Role::Vendor | Role::Customer => Err(role_denied),
        },
    }
}
