use crate::market::order_book::OrderQuote;
use ems_domain::{NearbySystem, OpportunityMode, OpportunityRecord, SystemId, TypeId};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub tax_pct: f64,
    pub broker_pct: f64,
}

impl FeeSchedule {
    /// Selling into a standing buy order only pays sales tax; posting a listing also pays the
    /// broker fee.
    pub fn fee_pct(&self, mode: OpportunityMode) -> f64 {
        match mode {
            OpportunityMode::Instant => self.tax_pct,
            OpportunityMode::List => self.tax_pct + self.broker_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitBreakdown {
    /// Target price after fees.
    pub net_sell_price: f64,
    /// Per unit, after fees and the purchase price.
    pub net_profit: f64,
    pub margin_pct: f64,
}

pub fn calc_profit(home_price: f64, target_price: f64, fee_pct: f64) -> ProfitBreakdown {
    let net_sell_price = target_price * (1.0 - fee_pct / 100.0);
    let net_profit = net_sell_price - home_price;
    let margin_pct = if home_price > 0.0 { net_profit / home_price * 100.0 } else { 0.0 };
    ProfitBreakdown {
        net_sell_price,
        net_profit,
        margin_pct,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringLimits {
    pub budget: f64,
    pub min_margin_pct: f64,
    pub fees: FeeSchedule,
    /// Cargo hold size in m3; `None` means unconstrained.
    pub cargo_volume: Option<f64>,
    pub min_profit_per_jump: Option<f64>,
}

/// One route to evaluate: buy `type_id` at `home`, sell at `target`.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub mode: OpportunityMode,
    pub type_id: TypeId,
    pub home_system_id: SystemId,
    pub home: OrderQuote,
    pub target: OrderQuote,
    pub target_system: &'a NearbySystem,
    pub unit_volume: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Rejection {
    #[error("target is the home system")]
    SameSystem,
    #[error("target is zero jumps away")]
    NoJumps,
    #[error("unit volume unknown or not positive")]
    UnknownVolume,
    #[error("target price {target_price} doesn't beat home price {home_price}")]
    NotProfitable { home_price: f64, target_price: f64 },
    #[error("margin {margin_pct:.2}% below minimum")]
    MarginTooLow { margin_pct: f64 },
    #[error("not a single unit fits into the cargo hold")]
    CargoTooSmall,
    #[error("trade size is zero")]
    NothingToTrade,
    #[error("profit per jump {profit_per_jump:.0} below minimum")]
    ProfitPerJumpTooLow { profit_per_jump: f64 },
}

pub fn score(candidate: &Candidate<'_>, limits: &ScoringLimits) -> Result<OpportunityRecord, Rejection> {
    let Candidate {
        mode,
        type_id,
        home_system_id,
        home,
        target,
        target_system,
        unit_volume,
    } = *candidate;

    if target.system_id == home_system_id {
        return Err(Rejection::SameSystem);
    }
    if target_system.jumps == 0 {
        return Err(Rejection::NoJumps);
    }
    let unit_volume = match unit_volume {
        Some(v) if v > 0.0 => v,
        _ => return Err(Rejection::UnknownVolume),
    };
    if target.price <= home.price {
        return Err(Rejection::NotProfitable {
            home_price: home.price,
            target_price: target.price,
        });
    }

    let fee_pct = limits.fees.fee_pct(mode);
    let profit = calc_profit(home.price, target.price, fee_pct);
    if profit.margin_pct < limits.min_margin_pct {
        return Err(Rejection::MarginTooLow {
            margin_pct: profit.margin_pct,
        });
    }

    let max_units_by_budget = if home.price > 0.0 { (limits.budget / home.price).floor().max(0.0) as u64 } else { 0 };
    let max_units_by_cargo = limits.cargo_volume.map(|cargo| (cargo / unit_volume).floor().max(0.0) as u64);
    if max_units_by_cargo == Some(0) {
        return Err(Rejection::CargoTooSmall);
    }

    let mut max_units_traded = max_units_by_budget;
    if let Some(by_cargo) = max_units_by_cargo {
        max_units_traded = max_units_traded.min(by_cargo);
    }
    if mode == OpportunityMode::Instant {
        max_units_traded = max_units_traded.min(target.volume_remain);
    }
    if max_units_traded == 0 {
        return Err(Rejection::NothingToTrade);
    }

    let total_profit = profit.net_profit * max_units_traded as f64;
    let profit_per_jump = total_profit / target_system.jumps as f64;
    if let Some(min_profit_per_jump) = limits.min_profit_per_jump {
        if profit_per_jump < min_profit_per_jump {
            return Err(Rejection::ProfitPerJumpTooLow { profit_per_jump });
        }
    }

    Ok(OpportunityRecord {
        mode,
        type_id,
        type_name: None,
        home_price: home.price,
        home_volume: home.volume_remain,
        target_price: target.price,
        target_system_id: target.system_id,
        target_system_name: target_system.name.clone(),
        jumps: target_system.jumps,
        security: target_system.security,
        profit_per_unit: profit.net_profit,
        margin_pct: profit.margin_pct,
        fee_pct,
        max_units_by_budget,
        max_units_by_cargo,
        max_units_traded,
        total_profit,
        profit_per_jump,
    })
}
