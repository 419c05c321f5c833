use candle_core::{Result, Tensor};

/// Bernoulli log-likelihood of binary-ish data given logits
///
/// llik(i) = sum_w x(i,w) * l(i,w) - log(1 + exp(l(i,w)))
///
/// The softplus is evaluated as `max(l,0) + log(1 + exp(-|l|))`.
///
/// * `x_nd` - data tensor (observed data in [0, 1])
/// * `logit_nd` - logit tensor (reconstruction)
///
pub fn bernoulli_logit_likelihood(x_nd: &Tensor, logit_nd: &Tensor) -> Result<Tensor> {
    let softplus_nd = (logit_nd.relu()? + (logit_nd.abs()?.neg()?.exp()? + 1.)?.log()?)?;
    (x_nd.mul(logit_nd)? - softplus_nd)?.sum(x_nd.rank() - 1)
}

/// Log-density of a diagonal Gaussian for every (sample, component) pair
///
/// log N(z(i,:) | mu(c,:), diag(exp(lnvar(c,:))))
///
/// * `z_nk` - samples (n x k)
/// * `mu_ck` - component means (c x k)
/// * `lnvar_ck` - component log-variances (c x k)
///
/// Returns an (n x c) tensor
pub fn diag_gaussian_log_density(z_nk: &Tensor, mu_ck: &Tensor, lnvar_ck: &Tensor) -> Result<Tensor> {
    let ln2pi = (2.0 * std::f64::consts::PI).ln();

    let diff_nck = z_nk.unsqueeze(1)?.broadcast_sub(&mu_ck.unsqueeze(0)?)?;
    let prec_1ck = lnvar_ck.neg()?.exp()?.unsqueeze(0)?;
    let quad_nck = diff_nck.sqr()?.broadcast_mul(&prec_1ck)?;

    (quad_nck.broadcast_add(&lnvar_ck.unsqueeze(0)?)? + ln2pi)?.sum(2)? * (-0.5)
}

/// KL divergence between a Gaussian posterior q(z|x) and a Gaussian
/// mixture prior, marginalising the component with the
/// responsibilities gamma = q(c|x)
///
/// 0.5 * sum_c gamma(c) sum_k [ lnvar(c,k) + exp(lv(k) - lnvar(c,k))
///                              + (m(k) - mu(c,k))^2 / var(c,k) ]
/// - sum_c gamma(c) [ log pi(c) - log gamma(c) ]
/// - 0.5 * sum_k (1 + lv(k))
///
/// * `z_mean_nk`, `z_lnvar_nk` - posterior parameters
/// * `log_gamma_nc` - log responsibilities
/// * `log_pi_c` - log mixture weights
/// * `mu_ck`, `lnvar_ck` - component parameters
pub fn gaussian_mixture_kl_loss(
    z_mean_nk: &Tensor,
    z_lnvar_nk: &Tensor,
    log_gamma_nc: &Tensor,
    log_pi_c: &Tensor,
    mu_ck: &Tensor,
    lnvar_ck: &Tensor,
) -> Result<Tensor> {
    let gamma_nc = log_gamma_nc.exp()?;

    let lnvar_1ck = lnvar_ck.unsqueeze(0)?;
    let lv_n1k = z_lnvar_nk.unsqueeze(1)?;

    let var_ratio_nck = lv_n1k.broadcast_sub(&lnvar_1ck)?.exp()?;
    let diff_nck = z_mean_nk.unsqueeze(1)?.broadcast_sub(&mu_ck.unsqueeze(0)?)?;
    let quad_nck = diff_nck.sqr()?.broadcast_mul(&lnvar_1ck.neg()?.exp()?)?;

    let cross_nc = var_ratio_nck
        .add(&quad_nck)?
        .broadcast_add(&lnvar_1ck)?
        .sum(2)?;

    let term1_n = (gamma_nc.mul(&cross_nc)?.sum(1)? * 0.5)?;

    let term2_n = gamma_nc
        .mul(&log_gamma_nc.broadcast_sub(&log_pi_c.unsqueeze(0)?)?.neg()?)?
        .sum(1)?;

    let term3_n = ((z_lnvar_nk + 1.)?.sum(1)? * 0.5)?;

    (term1_n - term2_n)? - term3_n
}
