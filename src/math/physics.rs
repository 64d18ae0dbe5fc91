use super::interpolate::InterpolationError;
use crate::config::Constants;

/// Calculate the Exner-like factor `(p0 / p)^kappa`; pressure in hPa
pub fn exner_factor(pressure: f64, constants: &Constants) -> f64 {
    (constants.p0 / pressure).powf(constants.kappa)
}

/// Calculate potential temperature from temperature and pressure (hPa)
pub fn potential_temperature(temperature: f64, pressure: f64, constants: &Constants) -> f64 {
    temperature * exner_factor(pressure, constants)
}

/// Calculate temperature from potential temperature and pressure (hPa)
pub fn temperature_from_potential(theta: f64, pressure: f64, constants: &Constants) -> f64 {
    theta / exner_factor(pressure, constants)
}

/// Temperature of the synthetic dataset at a level and latitude.
/// Warmer toward the surface, colder toward the poles.
pub fn synthetic_temperature(pressure: f64, latitude: f64, constants: &Constants) -> f64 {
    constants.t_base + constants.t_pressure_slope * pressure
        - constants.t_polar_drop * latitude.abs() / 90.0
}

/// Solve `theta = t(ln p) * (p0 / p)^kappa` for `ln p` by Newton iteration,
/// assuming temperature linear in `ln p`: `t = a * ln p + b`.
///
/// Iteration starts from `first_guess`. Fails with `NotConverged` when the
/// iteration diverges or does not meet the relative tolerance in
/// `constants.newton_max_iterations` steps.
pub fn solve_isentropic_log_pressure(
    theta: f64,
    a: f64,
    b: f64,
    first_guess: f64,
    constants: &Constants,
) -> Result<f64, InterpolationError> {
    let not_converged = || InterpolationError::NotConverged {
        theta,
        iterations: constants.newton_max_iterations,
    };
    let kappa = constants.kappa;
    let pok = constants.p0.powf(kappa);
    let mut log_p = first_guess;

    for _ in 0..constants.newton_max_iterations {
        let exner = pok * (-kappa * log_p).exp();
        let t = a * log_p + b;
        let f = theta - t * exner;
        let fp = exner * (kappa * t - a);
        let next = log_p - f / fp;
        if !next.is_finite() {
            return Err(not_converged());
        }
        let converged =
            (next - log_p).abs() <= constants.newton_tolerance * log_p.abs().max(1.0);
        log_p = next;
        if converged {
            return Ok(log_p);
        }
    }

    Err(not_converged())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pressure_is_identity() {
        let constants = Constants::default();
        assert_eq!(potential_temperature(288.0, 1000.0, &constants), 288.0);
    }

    #[test]
    fn test_newton_recovers_known_root() {
        let constants = Constants::default();
        // Isothermal layer at 250 K: theta(500 hPa) is known in closed form
        let theta = potential_temperature(250.0, 500.0, &constants);
        let log_p = solve_isentropic_log_pressure(theta, 0.0, 250.0, 600f64.ln(), &constants)
            .expect("converges");
        assert!((log_p.exp() - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_newton_reports_exhausted_iterations() {
        let constants = Constants {
            newton_max_iterations: 1,
            newton_tolerance: 1e-15,
            ..Constants::default()
        };
        let theta = potential_temperature(250.0, 500.0, &constants);
        let err = solve_isentropic_log_pressure(theta, 0.0, 250.0, 900f64.ln(), &constants).unwrap_err();
        assert_eq!(
            err,
            InterpolationError::NotConverged {
                theta,
                iterations: 1
            }
        );
    }
}
