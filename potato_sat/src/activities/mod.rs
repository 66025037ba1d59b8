pub mod recharge_potato;
