//! IMU calibration compensation.
//!
//! Two independent corrections can be applied to a sample:
//! - warm drift: `v[axis] -= slope[axis] * temperature + constant[axis]`
//! - scale/assembly: `v = (scale · assembly) · v`
//!
//! With both enabled only scale/assembly runs, on the uncompensated reading.

use crate::types::{ImuFlag, ImuIntrinsics, ImuSample, MotionIntrinsics, ProcessMode};

fn mat3_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn mat3_mul_vec(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn channel_mut(sample: &mut ImuSample) -> &mut [f64; 3] {
    match sample.flag {
        ImuFlag::Accel => &mut sample.accel,
        ImuFlag::Gyro => &mut sample.gyro,
    }
}

fn intrinsics_for(model: &MotionIntrinsics, flag: ImuFlag) -> &ImuIntrinsics {
    match flag {
        ImuFlag::Accel => &model.accel,
        ImuFlag::Gyro => &model.gyro,
    }
}

/// Remove the temperature-dependent bias from the sample's channel.
pub fn temperature_compensate(sample: &ImuSample, model: &MotionIntrinsics) -> ImuSample {
    let intrinsics = intrinsics_for(model, sample.flag);
    let temp = sample.temperature;
    let mut out = *sample;
    for (value, [constant, slope]) in channel_mut(&mut out).iter_mut().zip(intrinsics.warm_drift) {
        *value -= slope * temp + constant;
    }
    out
}

/// Apply the scale and assembly correction to the sample's channel.
pub fn scale_assembly_compensate(sample: &ImuSample, model: &MotionIntrinsics) -> ImuSample {
    let intrinsics = intrinsics_for(model, sample.flag);
    let m = mat3_mul(&intrinsics.scale, &intrinsics.assembly);
    let mut out = *sample;
    let channel = channel_mut(&mut out);
    *channel = mat3_mul_vec(&m, channel);
    out
}

/// Apply the enabled corrections to a single sample.
///
/// Without a calibration model the sample is returned unchanged.
pub fn compensate(
    sample: &ImuSample,
    mode: ProcessMode,
    model: Option<&MotionIntrinsics>,
) -> ImuSample {
    let Some(model) = model else {
        return *sample;
    };

    if mode.contains(ProcessMode::ASSEMBLY) {
        scale_assembly_compensate(sample, model)
    } else if mode.contains(ProcessMode::WARM_DRIFT) {
        temperature_compensate(sample, model)
    } else {
        *sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accel_sample(values: [f64; 3], temperature: f64) -> ImuSample {
        ImuSample {
            flag: ImuFlag::Accel,
            timestamp: 100,
            temperature,
            accel: values,
            gyro: [0.0; 3],
        }
    }

    fn gyro_sample(values: [f64; 3], temperature: f64) -> ImuSample {
        ImuSample {
            flag: ImuFlag::Gyro,
            timestamp: 200,
            temperature,
            accel: [0.0; 3],
            gyro: values,
        }
    }

    /// Scale doubles x, assembly swaps x/y, warm drift is large and distinct
    /// per axis, so every stage ordering gives a different result.
    fn model() -> MotionIntrinsics {
        let mut accel = ImuIntrinsics::identity();
        accel.scale = [[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 3.0]];
        accel.assembly = [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        accel.warm_drift = [[0.5, 0.1], [-0.25, 0.02], [1.0, -0.05]];

        let mut gyro = ImuIntrinsics::identity();
        gyro.scale = [[1.0, 0.1, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        gyro.warm_drift = [[10.0, 1.0], [20.0, 2.0], [30.0, 3.0]];

        MotionIntrinsics { accel, gyro }
    }

    #[test]
    fn test_no_model_is_identity() {
        let s = accel_sample([0.1, -0.2, 0.98], 31.5);
        for mode in [ProcessMode::empty(), ProcessMode::ASSEMBLY, ProcessMode::WARM_DRIFT, ProcessMode::ALL] {
            let out = compensate(&s, mode, None);
            assert_eq!(out, s);
            for i in 0..3 {
                assert_eq!(out.accel[i].to_bits(), s.accel[i].to_bits());
            }
        }
    }

    #[test]
    fn test_empty_mode_is_identity() {
        let m = model();
        let s = gyro_sample([1.0, 2.0, 3.0], 40.0);
        assert_eq!(compensate(&s, ProcessMode::empty(), Some(&m)), s);
    }

    #[test]
    fn test_temperature_compensate() {
        let m = model();
        let s = accel_sample([1.0, 1.0, 1.0], 20.0);
        let out = compensate(&s, ProcessMode::WARM_DRIFT, Some(&m));
        // x: 1 - (0.1 * 20 + 0.5), y: 1 - (0.02 * 20 - 0.25), z: 1 - (-0.05 * 20 + 1)
        assert!((out.accel[0] - (-1.5)).abs() < 1e-12);
        assert!((out.accel[1] - 0.85).abs() < 1e-12);
        assert!((out.accel[2] - 1.0).abs() < 1e-12);
        assert_eq!(out.gyro, [0.0; 3]);
        assert_eq!(out.temperature, 20.0);
    }

    #[test]
    fn test_temperature_uses_gyro_model_for_gyro() {
        let m = model();
        let s = gyro_sample([100.0, 100.0, 100.0], 1.0);
        let out = temperature_compensate(&s, &m);
        assert_eq!(out.gyro, [89.0, 78.0, 67.0]);
        assert_eq!(out.accel, [0.0; 3]);
    }

    #[test]
    fn test_scale_assembly_compensate() {
        let m = model();
        let s = accel_sample([1.0, 2.0, 3.0], 25.0);
        let out = compensate(&s, ProcessMode::ASSEMBLY, Some(&m));
        // scale · assembly = [[0,2,0],[1,0,0],[0,0,3]]
        assert_eq!(out.accel, [4.0, 1.0, 9.0]);
    }

    #[test]
    fn test_combined_mode_uses_raw_reading() {
        let m = model();
        let s = accel_sample([1.0, 2.0, 3.0], 25.0);

        let combined = compensate(&s, ProcessMode::ALL, Some(&m));
        let expected = scale_assembly_compensate(&s, &m);
        let chained = scale_assembly_compensate(&temperature_compensate(&s, &m), &m);

        assert_eq!(combined, expected);
        assert_ne!(combined.accel, chained.accel);
    }

    #[test]
    fn test_input_not_mutated() {
        let m = model();
        let s = gyro_sample([5.0, 6.0, 7.0], 30.0);
        let before = s;
        let _ = compensate(&s, ProcessMode::ALL, Some(&m));
        let _ = compensate(&s, ProcessMode::WARM_DRIFT, Some(&m));
        assert_eq!(s, before);
    }
}
