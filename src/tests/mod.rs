mod test_distributed_rate_limiter_factory;
mod test_rule_validation;
